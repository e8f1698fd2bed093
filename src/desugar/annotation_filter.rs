//! Removal of annotations that must not reach the output.
//!
//! Annotations are removed wherever they can occur: on classes, fields, methods and parameters,
//! and as type annotations, including those on instructions, exception handlers and local
//! variables inside `Code`. `MethodParameters` is always removed, matching what the platform
//! class path ships.

use std::collections::BTreeSet;

use super::DesugarError;
use crate::jvm::bytecode::{
    ClassFile, ConstantPool, FromReader, ParseError, ToWriter,
    attributes::{Annotation, AttributeInfo, Code, ParameterAnnotations, TypeAnnotation, names},
};

/// Removes every annotation whose descriptor is in `omitted_annotations`.
/// # Errors
/// Returns [`DesugarError`] if an attribute is malformed or cannot be re-encoded.
pub fn filter_annotations(
    class_file: &mut ClassFile,
    omitted_annotations: &BTreeSet<String>,
) -> Result<(), DesugarError> {
    let ClassFile {
        constant_pool,
        fields,
        methods,
        attributes,
        ..
    } = class_file;
    let filter = AnnotationFilter {
        constant_pool,
        omitted_annotations,
    };
    filter.filter_attributes(attributes, Scope::Class)?;
    for field in fields {
        filter.filter_attributes(&mut field.attributes, Scope::Field)?;
    }
    for method in methods {
        filter.filter_attributes(&mut method.attributes, Scope::Method)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Class,
    Field,
    Method,
    Code,
}

struct AnnotationFilter<'a> {
    constant_pool: &'a ConstantPool,
    omitted_annotations: &'a BTreeSet<String>,
}

impl AnnotationFilter<'_> {
    fn filter_attributes(
        &self,
        attributes: &mut Vec<AttributeInfo>,
        scope: Scope,
    ) -> Result<(), DesugarError> {
        let mut kept = Vec::with_capacity(attributes.len());
        for attribute in std::mem::take(attributes) {
            let filtered = match attribute.name(self.constant_pool)? {
                names::RUNTIME_VISIBLE_ANNOTATIONS | names::RUNTIME_INVISIBLE_ANNOTATIONS
                    if scope != Scope::Code =>
                {
                    self.filter_list::<Annotation>(attribute, |it| it)?
                }
                names::RUNTIME_VISIBLE_TYPE_ANNOTATIONS
                | names::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
                    self.filter_list::<TypeAnnotation>(attribute, |it| &it.annotation)?
                }
                names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
                | names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS
                    if scope == Scope::Method =>
                {
                    self.filter_parameters(attribute)?
                }
                names::METHOD_PARAMETERS if scope == Scope::Method => None,
                names::CODE if scope == Scope::Method => Some(self.filter_code(attribute)?),
                _ => Some(attribute),
            };
            kept.extend(filtered);
        }
        *attributes = kept;
        Ok(())
    }

    fn is_omitted(&self, annotation: &Annotation) -> Result<bool, ParseError> {
        Ok(self
            .omitted_annotations
            .contains(annotation.descriptor(self.constant_pool)?))
    }

    /// Filters a list of annotations. Returns `None` if nothing is left, and the untouched
    /// attribute if nothing is removed.
    fn filter_list<T>(
        &self,
        attribute: AttributeInfo,
        annotation_of: impl Fn(&T) -> &Annotation,
    ) -> Result<Option<AttributeInfo>, DesugarError>
    where
        T: FromReader,
        Vec<T>: FromReader + ToWriter,
    {
        let items: Vec<T> = attribute.decode()?;
        let original_len = items.len();
        let mut kept = Vec::with_capacity(original_len);
        for item in items {
            if !self.is_omitted(annotation_of(&item))? {
                kept.push(item);
            }
        }
        if kept.is_empty() {
            Ok(None)
        } else if kept.len() == original_len {
            Ok(Some(attribute))
        } else {
            Ok(Some(AttributeInfo::encode(attribute.name_index, &kept)?))
        }
    }

    fn filter_parameters(
        &self,
        attribute: AttributeInfo,
    ) -> Result<Option<AttributeInfo>, DesugarError> {
        let ParameterAnnotations(parameters) = attribute.decode()?;
        let mut changed = false;
        let mut filtered = Vec::with_capacity(parameters.len());
        for annotations in parameters {
            let mut kept = Vec::with_capacity(annotations.len());
            for annotation in annotations {
                if self.is_omitted(&annotation)? {
                    changed = true;
                } else {
                    kept.push(annotation);
                }
            }
            filtered.push(kept);
        }
        if !changed {
            Ok(Some(attribute))
        } else if filtered.iter().all(Vec::is_empty) {
            Ok(None)
        } else {
            let filtered = ParameterAnnotations(filtered);
            Ok(Some(AttributeInfo::encode(attribute.name_index, &filtered)?))
        }
    }

    fn filter_code(&self, attribute: AttributeInfo) -> Result<AttributeInfo, DesugarError> {
        let mut code: Code = attribute.decode()?;
        let original = code.attributes.clone();
        self.filter_attributes(&mut code.attributes, Scope::Code)?;
        if code.attributes == original {
            Ok(attribute)
        } else {
            Ok(AttributeInfo::encode(attribute.name_index, &code)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        jvm::access_flags::{FieldAccessFlags, MethodAccessFlags},
        jvm::bytecode::attributes::{TargetInfo, find_attribute},
        tests::ClassBuilder,
    };

    fn omitted() -> BTreeSet<String> {
        BTreeSet::from(["Lpkg/Gone;".to_owned()])
    }

    fn annotations(class_file: &ClassFile, attributes: &[AttributeInfo], name: &str) -> Vec<String> {
        let cp = &class_file.constant_pool;
        find_attribute(attributes, cp, name)
            .unwrap()
            .map(|it| it.decode::<Vec<Annotation>>().unwrap())
            .unwrap_or_default()
            .iter()
            .map(|it| it.descriptor(cp).unwrap().to_owned())
            .collect()
    }

    #[test]
    fn removes_omitted_annotations() {
        let mut class_file = ClassBuilder::new("pkg/Foo")
            .annotation("pkg/Gone")
            .field(FieldAccessFlags::PUBLIC, "f", "I")
            .annotation("pkg/Gone")
            .annotation("pkg/Kept")
            .method(MethodAccessFlags::PUBLIC, "m", "()V", &[0xb1])
            .invisible_annotation("pkg/Gone")
            .build_class();
        filter_annotations(&mut class_file, &omitted()).unwrap();

        assert!(class_file.attributes.is_empty());
        assert_eq!(
            annotations(
                &class_file,
                &class_file.fields[0].attributes,
                names::RUNTIME_VISIBLE_ANNOTATIONS
            ),
            ["Lpkg/Kept;"]
        );
        let method = &class_file.methods[0];
        assert_eq!(method.attributes.len(), 1);
        assert_eq!(method.attributes[0].name(&class_file.constant_pool).unwrap(), names::CODE);
    }

    #[test]
    fn untouched_class_keeps_its_bytes() {
        let bytes = ClassBuilder::new("pkg/Foo")
            .method(MethodAccessFlags::PUBLIC, "m", "()V", &[0xb1])
            .annotation("pkg/Kept")
            .build();
        let mut class_file = ClassFile::from_bytes(&bytes).unwrap();
        filter_annotations(&mut class_file, &omitted()).unwrap();
        assert_eq!(class_file.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn method_parameters_are_always_removed() {
        // One parameter named by entry #1 without flags.
        let mut class_file = ClassBuilder::new("pkg/Foo")
            .method(MethodAccessFlags::PUBLIC, "m", "(I)V", &[0xb1])
            .attribute(names::METHOD_PARAMETERS, &ParameterNames)
            .build_class();
        filter_annotations(&mut class_file, &omitted()).unwrap();
        assert_eq!(class_file.methods[0].attributes.len(), 1);
    }

    struct ParameterNames;

    impl ToWriter for ParameterNames {
        fn to_writer<W: std::io::Write + ?Sized>(
            &self,
            writer: &mut W,
        ) -> Result<(), crate::jvm::bytecode::GenerationError> {
            writer.write_all(&[0x01, 0x00, 0x01, 0x00, 0x00])?;
            Ok(())
        }
    }

    #[test]
    fn parameter_and_type_annotations() {
        let mut class_file = annotated_code_class();
        filter_annotations(&mut class_file, &omitted()).unwrap();
        let cp = &class_file.constant_pool;
        let method = &class_file.methods[0];

        let parameters = find_attribute(
            &method.attributes,
            cp,
            names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS,
        )
        .unwrap()
        .unwrap()
        .decode::<ParameterAnnotations>()
        .unwrap();
        assert_eq!(parameters.0.len(), 2);
        assert!(parameters.0[0].is_empty());
        assert_eq!(parameters.0[1].len(), 1);

        let code = method.code(cp).unwrap().unwrap();
        let type_annotations = find_attribute(
            &code.attributes,
            cp,
            names::RUNTIME_VISIBLE_TYPE_ANNOTATIONS,
        )
        .unwrap();
        assert_eq!(type_annotations, None);
    }

    #[test]
    fn instruction_type_annotations() {
        let mut class_file = ClassBuilder::new("pkg/Foo")
            .method(MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "m", "()V", &[0xb1])
            .build_class();
        let cp = &mut class_file.constant_pool;
        let gone = cp.put_utf8("Lpkg/Gone;").unwrap();
        let kept = cp.put_utf8("Lpkg/Kept;").unwrap();
        let name_index = cp.put_utf8(names::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS).unwrap();
        let type_annotation = |target_type, target_info, type_index| TypeAnnotation {
            target_type,
            target_info,
            target_path: vec![(3, 0)],
            annotation: Annotation {
                type_index,
                element_value_pairs: Vec::new(),
            },
        };
        // catch, instanceof, new, cast and a method type argument
        let all = vec![
            type_annotation(0x42, TargetInfo::Catch(0), gone),
            type_annotation(0x43, TargetInfo::Offset(0), kept),
            type_annotation(0x44, TargetInfo::Offset(0), gone),
            type_annotation(0x47, TargetInfo::TypeArgument(0, 0), gone),
            type_annotation(0x4A, TargetInfo::TypeArgument(0, 1), kept),
        ];
        let method = &mut class_file.methods[0];
        let mut code = method.code(&class_file.constant_pool).unwrap().unwrap();
        code.attributes.push(AttributeInfo::encode(name_index, &all).unwrap());
        method.attributes[0] = AttributeInfo::encode(method.attributes[0].name_index, &code).unwrap();

        filter_annotations(&mut class_file, &omitted()).unwrap();

        let cp = &class_file.constant_pool;
        let code = class_file.methods[0].code(cp).unwrap().unwrap();
        let remaining = find_attribute(&code.attributes, cp, names::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS)
            .unwrap()
            .unwrap()
            .decode::<Vec<TypeAnnotation>>()
            .unwrap();
        assert_eq!(remaining, [all[1].clone(), all[4].clone()]);
    }

    /// `m(II)V` with annotations on both parameters and a local variable type annotation.
    fn annotated_code_class() -> ClassFile {
        let mut class_file = ClassBuilder::new("pkg/Foo")
            .method(MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "m", "(II)V", &[0xb1])
            .build_class();
        let cp = &mut class_file.constant_pool;
        let gone = cp.put_utf8("Lpkg/Gone;").unwrap();
        let kept = cp.put_utf8("Lpkg/Kept;").unwrap();
        let annotation = |type_index| Annotation {
            type_index,
            element_value_pairs: Vec::new(),
        };
        let parameters = ParameterAnnotations(vec![vec![annotation(gone)], vec![annotation(kept)]]);
        let parameters_name = cp.put_utf8(names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS).unwrap();
        let local_variable = vec![TypeAnnotation {
            target_type: 0x40,
            target_info: TargetInfo::LocalVar(vec![(0, 1, 0)]),
            target_path: Vec::new(),
            annotation: annotation(gone),
        }];
        let type_annotations_name = cp.put_utf8(names::RUNTIME_VISIBLE_TYPE_ANNOTATIONS).unwrap();

        let method = &mut class_file.methods[0];
        let mut code = method.code(&class_file.constant_pool).unwrap().unwrap();
        code.attributes
            .push(AttributeInfo::encode(type_annotations_name, &local_variable).unwrap());
        method.attributes[0] = AttributeInfo::encode(method.attributes[0].name_index, &code).unwrap();
        method
            .attributes
            .push(AttributeInfo::encode(parameters_name, &parameters).unwrap());
        class_file
    }
}
