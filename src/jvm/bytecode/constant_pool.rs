//! Constant pool in a JVM class file.

use std::io::{self, Read, Write};

use super::{
    GenerationError, ToWriter,
    reader_utils::{ValueReaderExt, read_byte_chunk},
    write_length,
};
use crate::{
    jvm::{ClassMemberKey, JavaString},
    macros::see_jvm_spec,
};

/// The constant pool of a class file.
///
/// Slots are kept exactly as they were read, so indices held by instructions and attributes stay
/// valid. New entries are only ever appended.
#[doc = see_jvm_spec!(4, 4)]
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    inner: Vec<Slot>,
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Entry(Entry),
    Padding,
}

impl ConstantPool {
    /// Creates a new empty constant pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: vec![Slot::Padding],
        }
    }

    /// Parses a constant pool from the given reader.
    /// - `constant_pool_count` is the maximum index of entries in the constant pool plus one.
    ///
    /// # Errors
    /// Returns an [`io::Error`] if the reader fails or an entry has an unknown tag.
    pub fn from_reader<R>(reader: &mut R, constant_pool_count: u16) -> io::Result<Self>
    where
        R: Read + ?Sized,
    {
        // The `constant_pool` table is indexed from `1` to `constant_pool_count - 1`.
        let mut inner = Vec::with_capacity(usize::from(constant_pool_count));
        inner.push(Slot::Padding);
        while inner.len() < usize::from(constant_pool_count) {
            // NOTE: Do not use `put_entry` here since it will do deduplication.
            let entry = Entry::parse(reader)?;
            let takes_two_slots = matches!(entry, Entry::Long(_) | Entry::Double(_));
            inner.push(Slot::Entry(entry));
            if takes_two_slots {
                inner.push(Slot::Padding);
            }
        }
        if inner.len() != usize::from(constant_pool_count) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "A long or double entry overflows the constant pool",
            ));
        }
        Ok(Self { inner })
    }

    /// Gets the constant pool entry at the given index.
    /// # Errors
    /// - [`Error::BadIndex`] if `index` does not point to a valid entry.
    pub fn get_entry(&self, index: u16) -> Result<&Entry, Error> {
        match self.inner.get(usize::from(index)) {
            Some(Slot::Entry(entry)) => Ok(entry),
            _ => Err(Error::BadIndex(index)),
        }
    }

    /// Replaces the entry at `index`, keeping its slot.
    /// # Errors
    /// - [`Error::BadIndex`] if `index` does not point to a valid entry.
    /// - [`Error::Mismatch`] if the new entry does not occupy the same number of slots.
    pub fn replace_entry(&mut self, index: u16, entry: Entry) -> Result<(), Error> {
        let current = self.get_entry(index)?;
        if current.slot_count() != entry.slot_count() {
            return Err(Error::Mismatch {
                index,
                expected: current.constant_kind(),
                found: entry.constant_kind(),
            });
        }
        self.inner[usize::from(index)] = Slot::Entry(entry);
        Ok(())
    }

    /// Pushes a constant pool entry to the end of the constant pool, unless an equal entry is
    /// already present, in which case the index of the existing one is returned.
    /// # Errors
    /// - [`Error::Overflow`] if the constant pool is full.
    pub fn put_entry(&mut self, entry: Entry) -> Result<u16, Error> {
        if let Some(index) = self.find_index(|it| it == &entry) {
            return Ok(index);
        }
        let new_index = self.count();
        if self.inner.len() + usize::from(entry.slot_count()) > usize::from(u16::MAX) {
            return Err(Error::Overflow);
        }
        let takes_two_slots = entry.slot_count() == 2;
        self.inner.push(Slot::Entry(entry));
        if takes_two_slots {
            self.inner.push(Slot::Padding);
        }
        Ok(new_index)
    }

    /// Iterates over the entries along with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Entry)> {
        self.inner
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| match slot {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "The pool never grows beyond u16::MAX slots."
                )]
                Slot::Entry(entry) => Some((idx as u16, entry)),
                Slot::Padding => None,
            })
    }

    /// Finds the first constant pool entry that satisfies the given predicate.
    pub fn find<P>(&self, predicate: P) -> Option<(u16, &Entry)>
    where
        P: Fn(&Entry) -> bool,
    {
        self.iter().find(|(_, entry)| predicate(entry))
    }

    pub(crate) fn find_index<P>(&self, predicate: P) -> Option<u16>
    where
        P: Fn(&Entry) -> bool,
    {
        self.find(predicate).map(|(idx, _)| idx)
    }

    /// Gets the count of the constant pool. Note that this is NOT the number of entries.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "The pool never grows beyond u16::MAX slots."
    )]
    pub fn count(&self) -> u16 {
        self.inner.len() as u16
    }
}

/// Typed accessors.
impl ConstantPool {
    /// Gets the string of the [`Entry::Utf8`] at `index`.
    /// # Errors
    /// See [`Error`] for more information.
    pub fn get_str(&self, index: u16) -> Result<&str, Error> {
        match self.get_entry(index)? {
            Entry::Utf8(JavaString::ValidUtf8(value)) => Ok(value),
            Entry::Utf8(JavaString::InvalidUtf8(_)) => Err(Error::BrokenUtf8(index)),
            other => Err(Error::mismatch(index, "CONSTANT_Utf8", other)),
        }
    }

    /// Gets the binary name of the [`Entry::Class`] at `index`.
    /// # Errors
    /// See [`Error`] for more information.
    pub fn get_class_name(&self, index: u16) -> Result<&str, Error> {
        match self.get_entry(index)? {
            &Entry::Class { name_index } => self.get_str(name_index),
            other => Err(Error::mismatch(index, "CONSTANT_Class", other)),
        }
    }

    /// Gets the name and the descriptor of the [`Entry::NameAndType`] at `index`.
    /// # Errors
    /// See [`Error`] for more information.
    pub fn get_name_and_type(&self, index: u16) -> Result<(&str, &str), Error> {
        match self.get_entry(index)? {
            &Entry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.get_str(name_index)?, self.get_str(descriptor_index)?)),
            other => Err(Error::mismatch(index, "CONSTANT_NameAndType", other)),
        }
    }

    /// Gets the member referred to by the [`Entry::FieldRef`], [`Entry::MethodRef`] or
    /// [`Entry::InterfaceMethodRef`] at `index`.
    /// # Errors
    /// See [`Error`] for more information.
    pub fn get_member_key(&self, index: u16) -> Result<ClassMemberKey, Error> {
        match self.get_entry(index)? {
            &(Entry::FieldRef {
                class_index,
                name_and_type_index,
            }
            | Entry::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Entry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            }) => {
                let owner = self.get_class_name(class_index)?;
                let (name, descriptor) = self.get_name_and_type(name_and_type_index)?;
                Ok(ClassMemberKey::create(owner, name, descriptor))
            }
            other => Err(Error::mismatch(
                index,
                "CONSTANT_Fieldref | CONSTANT_Methodref | CONSTANT_InterfaceMethodref",
                other,
            )),
        }
    }

    /// Gets the kind and the referenced member of the [`Entry::MethodHandle`] at `index`.
    /// # Errors
    /// See [`Error`] for more information.
    pub fn get_method_handle(&self, index: u16) -> Result<(u8, ClassMemberKey), Error> {
        match self.get_entry(index)? {
            &Entry::MethodHandle {
                reference_kind,
                reference_index,
            } => Ok((reference_kind, self.get_member_key(reference_index)?)),
            other => Err(Error::mismatch(index, "CONSTANT_MethodHandle", other)),
        }
    }
}

/// Insertion helpers, all deduplicating.
impl ConstantPool {
    /// Puts an [`Entry::Utf8`].
    /// # Errors
    /// - [`Error::Overflow`] if the constant pool is full.
    pub fn put_utf8(&mut self, value: &str) -> Result<u16, Error> {
        self.put_entry(Entry::Utf8(JavaString::ValidUtf8(value.to_owned())))
    }

    /// Puts an [`Entry::Class`] with the given binary name.
    /// # Errors
    /// - [`Error::Overflow`] if the constant pool is full.
    pub fn put_class(&mut self, binary_name: &str) -> Result<u16, Error> {
        let name_index = self.put_utf8(binary_name)?;
        self.put_entry(Entry::Class { name_index })
    }

    /// Puts an [`Entry::NameAndType`].
    /// # Errors
    /// - [`Error::Overflow`] if the constant pool is full.
    pub fn put_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, Error> {
        let name_index = self.put_utf8(name)?;
        let descriptor_index = self.put_utf8(descriptor)?;
        self.put_entry(Entry::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Puts an [`Entry::FieldRef`] for the given field.
    /// # Errors
    /// - [`Error::Overflow`] if the constant pool is full.
    pub fn put_field_ref(&mut self, field: &ClassMemberKey) -> Result<u16, Error> {
        let class_index = self.put_class(field.owner())?;
        let name_and_type_index = self.put_name_and_type(field.name(), field.descriptor())?;
        self.put_entry(Entry::FieldRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Puts an [`Entry::MethodRef`], or an [`Entry::InterfaceMethodRef`] if `is_interface`.
    /// # Errors
    /// - [`Error::Overflow`] if the constant pool is full.
    pub fn put_method_ref(
        &mut self,
        method: &ClassMemberKey,
        is_interface: bool,
    ) -> Result<u16, Error> {
        let class_index = self.put_class(method.owner())?;
        let name_and_type_index = self.put_name_and_type(method.name(), method.descriptor())?;
        let entry = if is_interface {
            Entry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            }
        } else {
            Entry::MethodRef {
                class_index,
                name_and_type_index,
            }
        };
        self.put_entry(entry)
    }

    /// Puts an [`Entry::MethodHandle`] of the given kind pointing at `reference_index`.
    /// # Errors
    /// - [`Error::Overflow`] if the constant pool is full.
    pub fn put_method_handle(
        &mut self,
        reference_kind: u8,
        reference_index: u16,
    ) -> Result<u16, Error> {
        self.put_entry(Entry::MethodHandle {
            reference_kind,
            reference_index,
        })
    }

    /// Puts an [`Entry::MethodType`] with the given descriptor.
    /// # Errors
    /// - [`Error::Overflow`] if the constant pool is full.
    pub fn put_method_type(&mut self, descriptor: &str) -> Result<u16, Error> {
        let descriptor_index = self.put_utf8(descriptor)?;
        self.put_entry(Entry::MethodType { descriptor_index })
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ToWriter for ConstantPool {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        writer.write_all(&self.count().to_be_bytes())?;
        for slot in &self.inner {
            if let Slot::Entry(entry) = slot {
                entry.to_writer(writer)?;
            }
        }
        Ok(())
    }
}

/// An error when accessing or extending the constant pool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The index used to access the constant pool is invalid.
    #[error("Bad constant pool index: {0}")]
    BadIndex(u16),
    /// The constant pool is full.
    #[error("The constant pool is full")]
    Overflow,
    /// The UTF-8 entry does not hold valid modified UTF-8.
    #[error("Broken UTF-8 string at constant pool index {0}")]
    BrokenUtf8(u16),
    /// The entry is not of the expected kind.
    #[error("Expected {expected} at constant pool index {index}, found {found}")]
    Mismatch {
        /// The index of the entry.
        index: u16,
        /// The expected kind.
        expected: &'static str,
        /// The actual kind.
        found: &'static str,
    },
}

impl Error {
    fn mismatch(index: u16, expected: &'static str, found: &Entry) -> Self {
        Self::Mismatch {
            index,
            expected,
            found: found.constant_kind(),
        }
    }
}

/// An entry in the [`ConstantPool`].
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Entry {
    /// A UTF-8 string.
    #[doc = see_jvm_spec!(4, 4, 7)]
    Utf8(JavaString),
    /// An integer.
    #[doc = see_jvm_spec!(4, 4, 4)]
    Integer(i32),
    /// A float.
    #[doc = see_jvm_spec!(4, 4, 4)]
    Float(f32),
    /// A long.
    #[doc = see_jvm_spec!(4, 4, 5)]
    Long(i64),
    /// A double.
    #[doc = see_jvm_spec!(4, 4, 5)]
    Double(f64),
    /// A class.
    #[doc = see_jvm_spec!(4, 4, 1)]
    Class {
        /// The index in the constant pool of its binary name.
        name_index: u16,
    },
    /// A string.
    #[doc = see_jvm_spec!(4, 4, 3)]
    String {
        /// The index in the constant pool of its UTF-8 value.
        string_index: u16,
    },
    /// A field reference.
    #[doc = see_jvm_spec!(4, 4, 2)]
    FieldRef {
        /// The index of the [`Entry::Class`] containing the field.
        class_index: u16,
        /// The index of the [`Entry::NameAndType`] of the field.
        name_and_type_index: u16,
    },
    /// A method reference.
    #[doc = see_jvm_spec!(4, 4, 2)]
    MethodRef {
        /// The index of the [`Entry::Class`] containing the method.
        class_index: u16,
        /// The index of the [`Entry::NameAndType`] of the method.
        name_and_type_index: u16,
    },
    /// An interface method reference.
    #[doc = see_jvm_spec!(4, 4, 2)]
    InterfaceMethodRef {
        /// The index of the [`Entry::Class`] of the interface containing the method.
        class_index: u16,
        /// The index of the [`Entry::NameAndType`] of the method.
        name_and_type_index: u16,
    },
    /// A name and type.
    #[doc = see_jvm_spec!(4, 4, 6)]
    NameAndType {
        /// The index of the [`Entry::Utf8`] containing the name.
        name_index: u16,
        /// The index of the [`Entry::Utf8`] containing the descriptor.
        descriptor_index: u16,
    },
    /// A method handle.
    #[doc = see_jvm_spec!(4, 4, 8)]
    MethodHandle {
        /// The kind of method handle.
        reference_kind: u8,
        /// The index of the [`Entry::MethodRef`], [`Entry::InterfaceMethodRef`] or
        /// [`Entry::FieldRef`] the handle refers to.
        reference_index: u16,
    },
    /// A method type.
    #[doc = see_jvm_spec!(4, 4, 9)]
    MethodType {
        /// The index of the [`Entry::Utf8`] containing the descriptor.
        descriptor_index: u16,
    },
    /// A dynamically computed constant.
    #[doc = see_jvm_spec!(4, 4, 10)]
    Dynamic {
        /// The index of the bootstrap method in the bootstrap method table.
        bootstrap_method_attr_index: u16,
        /// The index of the [`Entry::NameAndType`] of the constant.
        name_and_type_index: u16,
    },
    /// An invokedynamic call site.
    #[doc = see_jvm_spec!(4, 4, 10)]
    InvokeDynamic {
        /// The index of the bootstrap method in the bootstrap method table.
        bootstrap_method_attr_index: u16,
        /// The index of the [`Entry::NameAndType`] of the call site.
        name_and_type_index: u16,
    },
    /// A module.
    #[doc = see_jvm_spec!(4, 4, 11)]
    Module {
        /// The index of the [`Entry::Utf8`] containing the name.
        name_index: u16,
    },
    /// A package.
    #[doc = see_jvm_spec!(4, 4, 12)]
    Package {
        /// The index of the [`Entry::Utf8`] containing the name.
        name_index: u16,
    },
}

impl Entry {
    /// Returns the tag of this constant pool entry.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Utf8(_) => 1,
            Self::Integer(_) => 3,
            Self::Float(_) => 4,
            Self::Long(_) => 5,
            Self::Double(_) => 6,
            Self::Class { .. } => 7,
            Self::String { .. } => 8,
            Self::FieldRef { .. } => 9,
            Self::MethodRef { .. } => 10,
            Self::InterfaceMethodRef { .. } => 11,
            Self::NameAndType { .. } => 12,
            Self::MethodHandle { .. } => 15,
            Self::MethodType { .. } => 16,
            Self::Dynamic { .. } => 17,
            Self::InvokeDynamic { .. } => 18,
            Self::Module { .. } => 19,
            Self::Package { .. } => 20,
        }
    }

    /// Gets the kind of this constant pool entry.
    #[must_use]
    pub const fn constant_kind(&self) -> &'static str {
        match self {
            Self::Utf8(_) => "CONSTANT_Utf8",
            Self::Integer(_) => "CONSTANT_Integer",
            Self::Float(_) => "CONSTANT_Float",
            Self::Long(_) => "CONSTANT_Long",
            Self::Double(_) => "CONSTANT_Double",
            Self::Class { .. } => "CONSTANT_Class",
            Self::String { .. } => "CONSTANT_String",
            Self::FieldRef { .. } => "CONSTANT_Fieldref",
            Self::MethodRef { .. } => "CONSTANT_Methodref",
            Self::InterfaceMethodRef { .. } => "CONSTANT_InterfaceMethodref",
            Self::NameAndType { .. } => "CONSTANT_NameAndType",
            Self::MethodHandle { .. } => "CONSTANT_MethodHandle",
            Self::MethodType { .. } => "CONSTANT_MethodType",
            Self::Dynamic { .. } => "CONSTANT_Dynamic",
            Self::InvokeDynamic { .. } => "CONSTANT_InvokeDynamic",
            Self::Module { .. } => "CONSTANT_Module",
            Self::Package { .. } => "CONSTANT_Package",
        }
    }

    const fn slot_count(&self) -> u8 {
        match self {
            Self::Long(_) | Self::Double(_) => 2,
            _ => 1,
        }
    }

    fn parse<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let tag: u8 = reader.read_value()?;
        let entry = match tag {
            1 => {
                let length: u16 = reader.read_value()?;
                let content = read_byte_chunk(reader, usize::from(length))?;
                match cesu8::from_java_cesu8(&content) {
                    Ok(value) => Self::Utf8(JavaString::ValidUtf8(value.into_owned())),
                    Err(_) => Self::Utf8(JavaString::InvalidUtf8(content)),
                }
            }
            3 => Self::Integer(reader.read_value()?),
            4 => Self::Float(reader.read_value()?),
            5 => Self::Long(reader.read_value()?),
            6 => Self::Double(reader.read_value()?),
            7 => Self::Class {
                name_index: reader.read_value()?,
            },
            8 => Self::String {
                string_index: reader.read_value()?,
            },
            9 => Self::FieldRef {
                class_index: reader.read_value()?,
                name_and_type_index: reader.read_value()?,
            },
            10 => Self::MethodRef {
                class_index: reader.read_value()?,
                name_and_type_index: reader.read_value()?,
            },
            11 => Self::InterfaceMethodRef {
                class_index: reader.read_value()?,
                name_and_type_index: reader.read_value()?,
            },
            12 => Self::NameAndType {
                name_index: reader.read_value()?,
                descriptor_index: reader.read_value()?,
            },
            15 => Self::MethodHandle {
                reference_kind: reader.read_value()?,
                reference_index: reader.read_value()?,
            },
            16 => Self::MethodType {
                descriptor_index: reader.read_value()?,
            },
            17 => Self::Dynamic {
                bootstrap_method_attr_index: reader.read_value()?,
                name_and_type_index: reader.read_value()?,
            },
            18 => Self::InvokeDynamic {
                bootstrap_method_attr_index: reader.read_value()?,
                name_and_type_index: reader.read_value()?,
            },
            19 => Self::Module {
                name_index: reader.read_value()?,
            },
            20 => Self::Package {
                name_index: reader.read_value()?,
            },
            unexpected => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Unexpected constant pool tag {unexpected}"),
                ));
            }
        };
        Ok(entry)
    }
}

impl ToWriter for Entry {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        writer.write_all(&[self.tag()])?;
        match self {
            Self::Utf8(JavaString::ValidUtf8(value)) => {
                let bytes = cesu8::to_java_cesu8(value);
                write_length::<u16>(writer, bytes.len())?;
                writer.write_all(&bytes)?;
            }
            Self::Utf8(JavaString::InvalidUtf8(bytes)) => {
                write_length::<u16>(writer, bytes.len())?;
                writer.write_all(bytes)?;
            }
            Self::Integer(value) => writer.write_all(&value.to_be_bytes())?,
            Self::Float(value) => writer.write_all(&value.to_be_bytes())?,
            Self::Long(value) => writer.write_all(&value.to_be_bytes())?,
            Self::Double(value) => writer.write_all(&value.to_be_bytes())?,
            Self::Class { name_index: index }
            | Self::String {
                string_index: index,
            }
            | Self::MethodType {
                descriptor_index: index,
            }
            | Self::Module { name_index: index }
            | Self::Package { name_index: index } => writer.write_all(&index.to_be_bytes())?,
            Self::FieldRef {
                class_index: first,
                name_and_type_index: second,
            }
            | Self::MethodRef {
                class_index: first,
                name_and_type_index: second,
            }
            | Self::InterfaceMethodRef {
                class_index: first,
                name_and_type_index: second,
            }
            | Self::NameAndType {
                name_index: first,
                descriptor_index: second,
            }
            | Self::Dynamic {
                bootstrap_method_attr_index: first,
                name_and_type_index: second,
            }
            | Self::InvokeDynamic {
                bootstrap_method_attr_index: first,
                name_and_type_index: second,
            } => {
                writer.write_all(&first.to_be_bytes())?;
                writer.write_all(&second.to_be_bytes())?;
            }
            Self::MethodHandle {
                reference_kind,
                reference_index,
            } => {
                writer.write_all(&[*reference_kind])?;
                writer.write_all(&reference_index.to_be_bytes())?;
            }
        }
        Ok(())
    }
}
