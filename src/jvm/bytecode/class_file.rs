use std::io::{self, Read, Write};

use super::{
    ConstantPool, FromReader, GenerationError, ParseError, ToWriter,
    attributes::{AttributeInfo, Code, find_attribute, names},
    errors::ParsingErrorContext,
    reader_utils::ValueReaderExt,
    write_length,
};
use crate::{
    jvm::{
        ClassMemberKey,
        access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags},
    },
    macros::see_jvm_spec,
};

/// The raw representation of a class file.
///
/// Reading a class and writing it back without touching it yields the same bytes.
#[doc = see_jvm_spec!(4, 1)]
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    /// The minor version.
    pub minor_version: u16,
    /// The major version.
    pub major_version: u16,
    /// The constant pool.
    pub constant_pool: ConstantPool,
    /// The access flags. Unknown bits are retained.
    pub access_flags: ClassAccessFlags,
    /// The index of the [`Entry::Class`](super::constant_pool::Entry::Class) of this class.
    pub this_class: u16,
    /// The index of the super class, or zero for `java/lang/Object` and modules.
    pub super_class: u16,
    /// The indices of the direct super interfaces.
    pub interfaces: Vec<u16>,
    /// The fields.
    pub fields: Vec<FieldInfo>,
    /// The methods.
    pub methods: Vec<MethodInfo>,
    /// The class level attributes.
    pub attributes: Vec<AttributeInfo>,
}

const JAVA_CLASS_MAGIC: u32 = 0xCAFE_BABE;

impl ClassFile {
    /// Parses a class file from its bytes.
    /// # Errors
    /// See [`ParseError`] for more information.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut reader = bytes;
        let class_file = Self::from_reader(&mut reader)?;
        if !reader.is_empty() {
            return Err(ParseError::malform("Trailing bytes after the class file"));
        }
        Ok(class_file)
    }

    /// Serializes the class file.
    /// # Errors
    /// See [`GenerationError`] for more information.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GenerationError> {
        let mut bytes = Vec::new();
        self.to_writer(&mut bytes)?;
        Ok(bytes)
    }

    /// The internal binary name of this class, e.g. `java/lang/String`.
    /// # Errors
    /// Returns [`ParseError`] if `this_class` does not point to a class entry.
    pub fn this_class_name(&self) -> Result<&str, ParseError> {
        self.constant_pool
            .get_class_name(self.this_class)
            .context("Invalid this_class")
    }
}

impl FromReader for ClassFile {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let magic: u32 = reader.read_value()?;
        if magic != JAVA_CLASS_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "This is not a Java class file",
            ));
        }
        let minor_version = reader.read_value()?;
        let major_version = reader.read_value()?;
        let constant_pool_count = reader.read_value()?;
        let constant_pool = ConstantPool::from_reader(reader, constant_pool_count)?;
        let access_flags = ClassAccessFlags::from_bits_retain(reader.read_value()?);
        let this_class = reader.read_value()?;
        let super_class = reader.read_value()?;
        let interfaces = Vec::from_reader(reader)?;
        let fields_count: u16 = reader.read_value()?;
        let fields = (0..fields_count)
            .map(|_| FieldInfo::from_reader(reader))
            .collect::<io::Result<_>>()?;
        let methods_count: u16 = reader.read_value()?;
        let methods = (0..methods_count)
            .map(|_| MethodInfo::from_reader(reader))
            .collect::<io::Result<_>>()?;
        let attributes = Vec::from_reader(reader)?;

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}

impl ToWriter for ClassFile {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        writer.write_all(&JAVA_CLASS_MAGIC.to_be_bytes())?;
        writer.write_all(&self.minor_version.to_be_bytes())?;
        writer.write_all(&self.major_version.to_be_bytes())?;
        self.constant_pool.to_writer(writer)?;
        writer.write_all(&self.access_flags.bits().to_be_bytes())?;
        writer.write_all(&self.this_class.to_be_bytes())?;
        writer.write_all(&self.super_class.to_be_bytes())?;
        self.interfaces.to_writer(writer)?;
        write_length::<u16>(writer, self.fields.len())?;
        for field in &self.fields {
            field.to_writer(writer)?;
        }
        write_length::<u16>(writer, self.methods.len())?;
        for method in &self.methods {
            method.to_writer(writer)?;
        }
        self.attributes.to_writer(writer)?;
        Ok(())
    }
}

/// A field declared in a class file.
#[doc = see_jvm_spec!(4, 5)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// The access flags.
    pub access_flags: FieldAccessFlags,
    /// The index of the field name.
    pub name_index: u16,
    /// The index of the field descriptor.
    pub descriptor_index: u16,
    /// The attributes.
    pub attributes: Vec<AttributeInfo>,
}

/// A method declared in a class file.
#[doc = see_jvm_spec!(4, 6)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// The access flags.
    pub access_flags: MethodAccessFlags,
    /// The index of the method name.
    pub name_index: u16,
    /// The index of the method descriptor.
    pub descriptor_index: u16,
    /// The attributes.
    pub attributes: Vec<AttributeInfo>,
}

macro_rules! member_info {
    ($($info:ident: $flags:ty),*) => {
        $(
            impl $info {
                /// Looks up the name.
                /// # Errors
                /// Returns [`ParseError`] if the name index is not a UTF-8 entry.
                pub fn name<'cp>(&self, constant_pool: &'cp ConstantPool) -> Result<&'cp str, ParseError> {
                    Ok(constant_pool.get_str(self.name_index)?)
                }

                /// Looks up the descriptor.
                /// # Errors
                /// Returns [`ParseError`] if the descriptor index is not a UTF-8 entry.
                pub fn descriptor<'cp>(
                    &self,
                    constant_pool: &'cp ConstantPool,
                ) -> Result<&'cp str, ParseError> {
                    Ok(constant_pool.get_str(self.descriptor_index)?)
                }

                /// Builds the key of this member as declared by `owner`.
                /// # Errors
                /// Returns [`ParseError`] if the name or the descriptor cannot be resolved.
                pub fn key(
                    &self,
                    owner: &str,
                    constant_pool: &ConstantPool,
                ) -> Result<ClassMemberKey, ParseError> {
                    Ok(ClassMemberKey::create(
                        owner,
                        self.name(constant_pool)?,
                        self.descriptor(constant_pool)?,
                    ))
                }
            }

            impl FromReader for $info {
                fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
                    Ok(Self {
                        access_flags: <$flags>::from_bits_retain(reader.read_value()?),
                        name_index: reader.read_value()?,
                        descriptor_index: reader.read_value()?,
                        attributes: Vec::from_reader(reader)?,
                    })
                }
            }

            impl ToWriter for $info {
                fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
                    writer.write_all(&self.access_flags.bits().to_be_bytes())?;
                    writer.write_all(&self.name_index.to_be_bytes())?;
                    writer.write_all(&self.descriptor_index.to_be_bytes())?;
                    self.attributes.to_writer(writer)?;
                    Ok(())
                }
            }
        )*
    };
}

member_info!(FieldInfo: FieldAccessFlags, MethodInfo: MethodAccessFlags);

impl FieldInfo {
    /// Checks if the field is declared `static`.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }
}

impl MethodInfo {
    /// Checks if the method is declared `static`.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Decodes the `Code` attribute, if the method has a body.
    /// # Errors
    /// Returns [`ParseError`] if the attribute is malformed.
    pub fn code(&self, constant_pool: &ConstantPool) -> Result<Option<Code>, ParseError> {
        find_attribute(&self.attributes, constant_pool, names::CODE)?
            .map(AttributeInfo::decode::<Code>)
            .transpose()
    }
}
