use tracing::debug;

use super::{
    Analysis, DesugarError,
    helpers::{bootstrap_methods, lambda_bootstrap, replacement_type_name, transform_to_static_companion},
};
use crate::jvm::{
    ClassMemberKey,
    access_flags::{ClassAccessFlags, MethodAccessFlags},
    bytecode::{
        ClassFile, ConstantPool, FieldInfo, MethodInfo,
        attributes::{AttributeInfo, BootstrapMethod, Code, names},
        constant_pool::Entry,
        instruction::{self, InstructionKind, opcodes},
    },
};

/// Generates the companion class of `base`, holding the static versions of every member of
/// `base` that `analysis` moves. Returns `None` if nothing is moved out of `base`.
///
/// The companion is a `public final synthetic` class named `Desugar<SimpleName>` in the package
/// of `base`, with a private no-argument constructor and no other state. Its constant pool starts
/// as a copy of the pool of `base`, so copied members and bodies keep their indices.
/// # Errors
/// - [`DesugarError::NoMethodBody`] or [`DesugarError::UnrelocatableMethod`] if a moved method
///   cannot be copied.
/// - [`DesugarError::UnsupportedBootstrap`] if a copied body creates a lambda through
///   `altMetafactory` or with unexpected metafactory arguments.
pub fn generate_companion(
    base: &ClassFile,
    analysis: &Analysis,
) -> Result<Option<ClassFile>, DesugarError> {
    let base_name = base.this_class_name()?;
    let supported_fields = base
        .fields
        .iter()
        .filter_map(|field| {
            field
                .key(base_name, &base.constant_pool)
                .map(|key| analysis.replacement_field(&key).map(|it| (field, it)))
                .transpose()
        })
        .collect::<Result<Vec<_>, _>>()?;
    let supported_methods = base
        .methods
        .iter()
        .map(|method| method.key(base_name, &base.constant_pool))
        .zip(&base.methods)
        .filter_map(|(key, method)| {
            key.map(|key| analysis.replacement_method(&key).is_some().then_some(method))
                .transpose()
        })
        .collect::<Result<Vec<_>, _>>()?;
    if supported_fields.is_empty() && supported_methods.is_empty() {
        return Ok(None);
    }

    let companion_name = replacement_type_name(base_name);
    let mut constant_pool = base.constant_pool.clone();
    let this_class = constant_pool.put_class(&companion_name)?;
    let super_class = constant_pool.put_class("java/lang/Object")?;

    let mut fields = Vec::with_capacity(supported_fields.len());
    for (field, replacement) in supported_fields {
        let attributes = field
            .attributes
            .iter()
            .filter(|it| {
                matches!(
                    it.name(&constant_pool),
                    Ok(names::CONSTANT_VALUE | names::SIGNATURE)
                )
            })
            .cloned()
            .collect();
        fields.push(FieldInfo {
            access_flags: field.access_flags.into_public(),
            name_index: constant_pool.put_utf8(replacement.name())?,
            descriptor_index: constant_pool.put_utf8(replacement.descriptor())?,
            attributes,
        });
    }

    let mut methods = Vec::with_capacity(supported_methods.len() + 1);
    methods.push(private_constructor(&mut constant_pool)?);
    let mut uses_invokedynamic = false;
    let bootstraps = bootstrap_methods(base)?;
    for method in supported_methods {
        let moved = transform_to_static_companion(&mut constant_pool, base_name, method)?;
        if let Some(code) = moved.code(&constant_pool)? {
            for insn in instruction::decode(&code.code)? {
                if let InstructionKind::InvokeDynamic { index } = insn.kind {
                    uses_invokedynamic = true;
                    check_lambda_bootstrap(&constant_pool, &bootstraps, index, base_name)?;
                }
            }
        }
        methods.push(moved);
    }

    let mut attributes = Vec::new();
    if uses_invokedynamic {
        let bootstrap_attribute =
            base.attributes
                .iter()
                .find(|it| matches!(it.name(&constant_pool), Ok(names::BOOTSTRAP_METHODS)));
        attributes.extend(bootstrap_attribute.cloned());
    }

    debug!(
        companion = %companion_name,
        fields = fields.len(),
        methods = methods.len() - 1,
        "Generated companion class"
    );
    Ok(Some(ClassFile {
        minor_version: base.minor_version,
        major_version: base.major_version,
        constant_pool,
        access_flags: ClassAccessFlags::SYNTHETIC
            | ClassAccessFlags::PUBLIC
            | ClassAccessFlags::SUPER
            | ClassAccessFlags::FINAL,
        this_class,
        super_class,
        interfaces: Vec::new(),
        fields,
        methods,
        attributes,
    }))
}

/// `private <init>()V { aload_0; invokespecial java/lang/Object.<init>()V; return }`
fn private_constructor(constant_pool: &mut ConstantPool) -> Result<MethodInfo, DesugarError> {
    let object_init = constant_pool.put_method_ref(
        &ClassMemberKey::create("java/lang/Object", "<init>", "()V"),
        false,
    )?;
    let [hi, lo] = object_init.to_be_bytes();
    let code = Code {
        max_stack: 1,
        max_locals: 1,
        code: vec![opcodes::ALOAD_0, opcodes::INVOKESPECIAL, hi, lo, opcodes::RETURN],
        exception_table: Vec::new(),
        attributes: Vec::new(),
    };
    let code_name_index = constant_pool.put_utf8(names::CODE)?;
    Ok(MethodInfo {
        access_flags: MethodAccessFlags::PRIVATE,
        name_index: constant_pool.put_utf8("<init>")?,
        descriptor_index: constant_pool.put_utf8("()V")?,
        attributes: vec![AttributeInfo::encode(code_name_index, &code)?],
    })
}

fn check_lambda_bootstrap(
    constant_pool: &ConstantPool,
    bootstraps: &[BootstrapMethod],
    indy_index: u16,
    base_name: &str,
) -> Result<(), DesugarError> {
    let unsupported = |reason: String| DesugarError::UnsupportedBootstrap {
        class: base_name.to_owned(),
        reason,
    };
    match lambda_bootstrap(constant_pool, bootstraps, indy_index)? {
        Some((factory, bootstrap)) if factory == "metafactory" => {
            let has_handle = bootstrap.arguments.len() == 3
                && matches!(
                    constant_pool.get_entry(bootstrap.arguments[1])?,
                    Entry::MethodHandle { .. }
                );
            if has_handle {
                Ok(())
            } else {
                Err(unsupported(format!(
                    "invalid arguments to the lambda metafactory (number of arguments {})",
                    bootstrap.arguments.len()
                )))
            }
        }
        Some((factory, _)) if factory == "altMetafactory" => {
            Err(unsupported("lambda altMetafactory".to_owned()))
        }
        _ => Ok(()),
    }
}
