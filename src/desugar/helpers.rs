//! Naming rules, descriptor transformations and annotation lookups shared by the passes.

use std::collections::BTreeSet;

use super::DesugarError;
use crate::{
    jvm::{
        ClassMemberKey,
        access_flags::MethodAccessFlags,
        bytecode::{
            ClassFile, ConstantPool, MethodInfo, ParseError,
            attributes::{
                Annotation, AttributeInfo, BootstrapMethod, ParameterAnnotations, find_attribute,
                names,
            },
            constant_pool::Entry,
        },
    },
    types::{Descriptor, InvalidDescriptor, field_type::FieldType, method_descriptor::MethodDescriptor},
};

/// Inserted before the simple name of a class to name its companion.
pub const DESUGAR_API_CLASS_PREFIX: &str = "Desugar";

/// The owner of the lambda bootstrap methods.
pub const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

const DERIVED_NIO_BUFFERS: [&str; 8] = [
    "java/nio/ByteBuffer",
    "java/nio/CharBuffer",
    "java/nio/DoubleBuffer",
    "java/nio/FloatBuffer",
    "java/nio/IntBuffer",
    "java/nio/LongBuffer",
    "java/nio/MappedByteBuffer",
    "java/nio/ShortBuffer",
];

const NIO_BUFFER_COVARIANT_RETURN_TYPED_METHODS: [&str; 7] =
    ["position", "limit", "mark", "reset", "clear", "flip", "rewind"];

/// The descriptor of the static version of an instance method of `owner`: the receiver becomes
/// the first parameter.
/// # Errors
/// Returns [`InvalidDescriptor`] if `descriptor` is not a method descriptor.
pub fn instance_method_to_static_descriptor(
    owner: &str,
    descriptor: &str,
) -> Result<String, InvalidDescriptor> {
    let MethodDescriptor {
        parameters_types,
        return_type,
    } = descriptor.parse()?;
    let parameters_types = std::iter::once(FieldType::Object(owner.to_owned()))
        .chain(parameters_types)
        .collect();
    Ok(MethodDescriptor {
        parameters_types,
        return_type,
    }
    .descriptor())
}

/// The internal name of the companion of `type_name`, in the same package.
#[must_use]
pub fn replacement_type_name(type_name: &str) -> String {
    match type_name.rsplit_once('/') {
        Some((package, simple_name)) => {
            format!("{package}/{DESUGAR_API_CLASS_PREFIX}{simple_name}")
        }
        None => format!("{DESUGAR_API_CLASS_PREFIX}{type_name}"),
    }
}

/// The key of the companion version of a method.
/// # Errors
/// Returns [`InvalidDescriptor`] if the descriptor of an instance method cannot be parsed.
pub fn replacement_method_key(
    is_static: bool,
    method: &ClassMemberKey,
) -> Result<ClassMemberKey, InvalidDescriptor> {
    let descriptor = if is_static {
        method.descriptor().to_owned()
    } else {
        instance_method_to_static_descriptor(method.owner(), method.descriptor())?
    };
    Ok(ClassMemberKey::create(
        replacement_type_name(method.owner()),
        method.name(),
        descriptor,
    ))
}

/// The key of the companion version of a field.
#[must_use]
pub fn replacement_field_key(field: &ClassMemberKey) -> ClassMemberKey {
    ClassMemberKey::create(
        replacement_type_name(field.owner()),
        field.name(),
        field.descriptor(),
    )
}

/// Covariant return typed methods of the NIO buffers, which are handled by the dexer.
#[must_use]
pub fn is_covariant_return_typed_method(method: &ClassMemberKey) -> bool {
    DERIVED_NIO_BUFFERS.contains(&method.owner())
        && NIO_BUFFER_COVARIANT_RETURN_TYPED_METHODS.contains(&method.name())
}

/// Checks whether any of the annotations (visible or invisible) in `attributes` is of a type in
/// `annotation_names`, given as internal names.
/// # Errors
/// Returns [`ParseError`] if an annotation attribute is malformed.
pub fn has_any_annotation(
    attributes: &[AttributeInfo],
    constant_pool: &ConstantPool,
    annotation_names: &BTreeSet<String>,
) -> Result<bool, ParseError> {
    for attribute_name in [
        names::RUNTIME_VISIBLE_ANNOTATIONS,
        names::RUNTIME_INVISIBLE_ANNOTATIONS,
    ] {
        let Some(attribute) = find_attribute(attributes, constant_pool, attribute_name)? else {
            continue;
        };
        for annotation in attribute.decode::<Vec<Annotation>>()? {
            let descriptor = annotation.descriptor(constant_pool)?;
            let is_listed = descriptor
                .strip_prefix('L')
                .and_then(|it| it.strip_suffix(';'))
                .is_some_and(|name| annotation_names.contains(name));
            if is_listed {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Decodes the `BootstrapMethods` attribute of a class, if any.
/// # Errors
/// Returns [`ParseError`] if the attribute is malformed.
pub fn bootstrap_methods(class_file: &ClassFile) -> Result<Vec<BootstrapMethod>, ParseError> {
    find_attribute(
        &class_file.attributes,
        &class_file.constant_pool,
        names::BOOTSTRAP_METHODS,
    )?
    .map_or_else(|| Ok(Vec::new()), AttributeInfo::decode::<Vec<BootstrapMethod>>)
}

/// The bootstrap method of the call site at `indy_index`, with the name of its bootstrap
/// method if it is owned by the [`LAMBDA_METAFACTORY`].
pub(crate) fn lambda_bootstrap<'b>(
    constant_pool: &ConstantPool,
    bootstrap_methods: &'b [BootstrapMethod],
    indy_index: u16,
) -> Result<Option<(String, &'b BootstrapMethod)>, DesugarError> {
    let &Entry::InvokeDynamic {
        bootstrap_method_attr_index,
        ..
    } = constant_pool.get_entry(indy_index)?
    else {
        return Err(ParseError::malform(format!(
            "Constant pool index {indy_index} is not an invokedynamic call site"
        ))
        .into());
    };
    let bootstrap = bootstrap_methods
        .get(usize::from(bootstrap_method_attr_index))
        .ok_or_else(|| {
            ParseError::malform(format!(
                "Bootstrap method {bootstrap_method_attr_index} does not exist"
            ))
        })?;
    let (_, bootstrap_method) = constant_pool.get_method_handle(bootstrap.method_ref_index)?;
    if bootstrap_method.owner() == LAMBDA_METAFACTORY {
        Ok(Some((bootstrap_method.name().to_owned(), bootstrap)))
    } else {
        Ok(None)
    }
}

/// The implementation method of a lambda, which is the method handle passed as the second static
/// argument to the metafactory.
pub(crate) fn lambda_implementation(
    constant_pool: &ConstantPool,
    bootstrap: &BootstrapMethod,
) -> Result<Option<ClassMemberKey>, DesugarError> {
    let Some(&argument) = bootstrap.arguments.get(1) else {
        return Ok(None);
    };
    match constant_pool.get_entry(argument)? {
        Entry::MethodHandle { .. } => {
            let (_, implementation) = constant_pool.get_method_handle(argument)?;
            Ok(Some(implementation))
        }
        _ => Ok(None),
    }
}

/// Turns a method of `owner` into its counterpart in the companion class. For instance,
/// `Double#sum(double, double)` becomes `DesugarDouble#sum(double, double)` and the instance
/// method `String#strip()` becomes the static `DesugarString#strip(String)`.
///
/// The returned method lives in the constant pool of the companion, which starts as a copy of the
/// pool of `owner`. Copies are made public so that rewritten call sites can reach them.
/// # Errors
/// - [`DesugarError::NoMethodBody`] for abstract and native methods.
/// - [`DesugarError::UnrelocatableMethod`] for initializers.
pub fn transform_to_static_companion(
    constant_pool: &mut ConstantPool,
    owner: &str,
    method: &MethodInfo,
) -> Result<MethodInfo, DesugarError> {
    let key = method.key(owner, constant_pool)?;
    if method
        .access_flags
        .intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE)
    {
        return Err(DesugarError::NoMethodBody(key));
    }
    if key.name() == "<init>" || key.name() == "<clinit>" {
        return Err(DesugarError::UnrelocatableMethod {
            key,
            reason: "initializers cannot be moved to another class",
        });
    }
    if method.is_static() {
        return Ok(MethodInfo {
            access_flags: method.access_flags.into_public(),
            ..method.clone()
        });
    }

    let descriptor = instance_method_to_static_descriptor(owner, key.descriptor())?;
    let descriptor_index = constant_pool.put_utf8(&descriptor)?;
    let mut attributes = Vec::with_capacity(method.attributes.len());
    for attribute in &method.attributes {
        match attribute.name(constant_pool)? {
            // The generic signature and the parameter names do not account for the receiver.
            names::SIGNATURE | names::METHOD_PARAMETERS => {}
            names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
            | names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
                let mut annotations: ParameterAnnotations = attribute.decode()?;
                annotations.0.insert(0, Vec::new());
                attributes.push(AttributeInfo::encode(attribute.name_index, &annotations)?);
            }
            _ => attributes.push(attribute.clone()),
        }
    }
    Ok(MethodInfo {
        access_flags: method.access_flags.into_public() | MethodAccessFlags::STATIC,
        name_index: method.name_index,
        descriptor_index,
        attributes,
    })
}
