//! Substitution of internal type names throughout a class.
//!
//! Class entries, descriptors in the constant pool and on members, generic signatures and local
//! variable tables are re-pointed at new UTF-8 entries carrying the substituted names. Existing
//! UTF-8 entries are never modified, since they may be shared with unrelated strings.

use super::{Analysis, DesugarError};
use crate::{
    jvm::bytecode::{
        ClassFile, ConstantPool,
        attributes::{AttributeInfo, Code, LocalVariable, names},
        constant_pool::Entry,
    },
    types::{
        Descriptor, InvalidDescriptor, field_type::FieldType, method_descriptor::MethodDescriptor,
        signature::remap_signature,
    },
};

/// Substitutes every type name for which `analysis` has a replacement.
/// # Errors
/// Returns [`DesugarError`] if a descriptor or signature is malformed, or the constant pool
/// overflows.
pub fn replace_types(class_file: &mut ClassFile, analysis: &Analysis) -> Result<(), DesugarError> {
    if !analysis.has_type_replacements() {
        return Ok(());
    }
    let remapper = TypeRemapper { analysis };
    let ClassFile {
        constant_pool,
        fields,
        methods,
        attributes,
        ..
    } = class_file;

    let entries = constant_pool
        .iter()
        .map(|(index, entry)| (index, entry.clone()))
        .collect::<Vec<_>>();
    for (index, entry) in entries {
        match entry {
            Entry::Class { name_index } => {
                let new_index = remapper.remap_utf8(constant_pool, name_index, |name| {
                    remapper.remap_class_name(name)
                })?;
                if new_index != name_index {
                    constant_pool.replace_entry(index, Entry::Class { name_index: new_index })?;
                }
            }
            Entry::NameAndType {
                name_index,
                descriptor_index,
            } => {
                let new_index = remapper.remap_utf8(constant_pool, descriptor_index, |it| {
                    remapper.remap_descriptor(it)
                })?;
                if new_index != descriptor_index {
                    constant_pool.replace_entry(
                        index,
                        Entry::NameAndType {
                            name_index,
                            descriptor_index: new_index,
                        },
                    )?;
                }
            }
            Entry::MethodType { descriptor_index } => {
                let new_index = remapper.remap_utf8(constant_pool, descriptor_index, |it| {
                    remapper.remap_descriptor(it)
                })?;
                if new_index != descriptor_index {
                    constant_pool.replace_entry(
                        index,
                        Entry::MethodType {
                            descriptor_index: new_index,
                        },
                    )?;
                }
            }
            _ => {}
        }
    }

    remapper.remap_signatures(constant_pool, attributes)?;
    for field in fields {
        field.descriptor_index =
            remapper.remap_utf8(constant_pool, field.descriptor_index, |it| {
                remapper.remap_descriptor(it)
            })?;
        remapper.remap_signatures(constant_pool, &mut field.attributes)?;
    }
    for method in methods {
        method.descriptor_index =
            remapper.remap_utf8(constant_pool, method.descriptor_index, |it| {
                remapper.remap_descriptor(it)
            })?;
        remapper.remap_signatures(constant_pool, &mut method.attributes)?;
        for attribute in &mut method.attributes {
            if attribute.name(constant_pool)? == names::CODE {
                let mut code: Code = attribute.decode()?;
                if remapper.remap_local_variables(constant_pool, &mut code.attributes)? {
                    *attribute = AttributeInfo::encode(attribute.name_index, &code)?;
                }
            }
        }
    }
    Ok(())
}

struct TypeRemapper<'a> {
    analysis: &'a Analysis,
}

impl TypeRemapper<'_> {
    fn mapper(&self) -> impl Fn(&str) -> Option<String> + '_ {
        |name| self.analysis.replacement_type(name)
    }

    /// Class entries hold either an internal name or, for array classes, a descriptor.
    fn remap_class_name(&self, name: &str) -> Result<String, InvalidDescriptor> {
        if name.starts_with('[') {
            return self.remap_descriptor(name);
        }
        Ok(self
            .analysis
            .replacement_type(name)
            .unwrap_or_else(|| name.to_owned()))
    }

    fn remap_descriptor(&self, descriptor: &str) -> Result<String, InvalidDescriptor> {
        let mapper = self.mapper();
        if descriptor.starts_with('(') {
            Ok(descriptor.parse::<MethodDescriptor>()?.remap(&mapper).descriptor())
        } else {
            Ok(descriptor.parse::<FieldType>()?.remap(&mapper).descriptor())
        }
    }

    /// Returns the index of the remapped string, which is `index` itself if nothing changed.
    fn remap_utf8<F>(
        &self,
        constant_pool: &mut ConstantPool,
        index: u16,
        remap: F,
    ) -> Result<u16, DesugarError>
    where
        F: Fn(&str) -> Result<String, InvalidDescriptor>,
    {
        let original = constant_pool.get_str(index)?;
        let remapped = remap(original)?;
        if remapped == original {
            Ok(index)
        } else {
            Ok(constant_pool.put_utf8(&remapped)?)
        }
    }

    fn remap_signatures(
        &self,
        constant_pool: &mut ConstantPool,
        attributes: &mut [AttributeInfo],
    ) -> Result<(), DesugarError> {
        let mapper = self.mapper();
        for attribute in attributes {
            if attribute.name(constant_pool)? != names::SIGNATURE {
                continue;
            }
            let signature_index: u16 = attribute.decode()?;
            let new_index = self.remap_utf8(constant_pool, signature_index, |it| {
                remap_signature(it, &mapper)
            })?;
            if new_index != signature_index {
                *attribute = AttributeInfo::encode(attribute.name_index, &new_index)?;
            }
        }
        Ok(())
    }

    /// Remaps `LocalVariableTable` and `LocalVariableTypeTable`. Returns whether anything changed.
    fn remap_local_variables(
        &self,
        constant_pool: &mut ConstantPool,
        attributes: &mut [AttributeInfo],
    ) -> Result<bool, DesugarError> {
        let mapper = self.mapper();
        let mut changed = false;
        for attribute in attributes {
            let is_signature = match attribute.name(constant_pool)? {
                names::LOCAL_VARIABLE_TABLE => false,
                names::LOCAL_VARIABLE_TYPE_TABLE => true,
                _ => continue,
            };
            let mut variables: Vec<LocalVariable> = attribute.decode()?;
            let mut table_changed = false;
            for variable in &mut variables {
                let new_index = self.remap_utf8(constant_pool, variable.descriptor_index, |it| {
                    if is_signature {
                        remap_signature(it, &mapper)
                    } else {
                        self.remap_descriptor(it)
                    }
                })?;
                table_changed |= new_index != variable.descriptor_index;
                variable.descriptor_index = new_index;
            }
            if table_changed {
                *attribute = AttributeInfo::encode(attribute.name_index, &variables)?;
                changed = true;
            }
        }
        Ok(changed)
    }
}
