//! Raw attributes and the codecs of the attributes the rewriting passes look into.

use std::io::{self, Read, Write};

use super::{
    ConstantPool, FromReader, GenerationError, ParseError, ToWriter,
    errors::ParsingErrorContext,
    reader_utils::{ValueReaderExt, read_byte_chunk},
    write_length,
};
use crate::macros::see_jvm_spec;

/// Names of the attributes this crate reads or writes.
pub mod names {
    /// `Code`
    pub const CODE: &str = "Code";
    /// `ConstantValue`
    pub const CONSTANT_VALUE: &str = "ConstantValue";
    /// `Signature`
    pub const SIGNATURE: &str = "Signature";
    /// `BootstrapMethods`
    pub const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
    /// `MethodParameters`
    pub const METHOD_PARAMETERS: &str = "MethodParameters";
    /// `LocalVariableTable`
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    /// `LocalVariableTypeTable`
    pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
    /// `RuntimeVisibleAnnotations`
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    /// `RuntimeInvisibleAnnotations`
    pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
    /// `RuntimeVisibleParameterAnnotations`
    pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
    /// `RuntimeInvisibleParameterAnnotations`
    pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str =
        "RuntimeInvisibleParameterAnnotations";
    /// `RuntimeVisibleTypeAnnotations`
    pub const RUNTIME_VISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeVisibleTypeAnnotations";
    /// `RuntimeInvisibleTypeAnnotations`
    pub const RUNTIME_INVISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeInvisibleTypeAnnotations";
}

/// An attribute as it appears in the class file: a name and an opaque payload.
#[doc = see_jvm_spec!(4, 7)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    /// The index of the [`Entry::Utf8`](super::constant_pool::Entry::Utf8) holding the name.
    pub name_index: u16,
    /// The payload.
    pub info: Vec<u8>,
}

impl AttributeInfo {
    /// Looks up the name of the attribute.
    /// # Errors
    /// Returns [`ParseError`] if the name index is not a UTF-8 entry.
    pub fn name<'cp>(&self, constant_pool: &'cp ConstantPool) -> Result<&'cp str, ParseError> {
        Ok(constant_pool.get_str(self.name_index)?)
    }

    /// Decodes the payload, which must be consumed entirely.
    /// # Errors
    /// Returns [`ParseError`] if the payload is malformed.
    pub fn decode<T: FromReader>(&self) -> Result<T, ParseError> {
        let mut reader = self.info.as_slice();
        let value = T::from_reader(&mut reader)?;
        if !reader.is_empty() {
            return Err(ParseError::malform(format!(
                "{} trailing bytes in attribute",
                reader.len()
            )));
        }
        Ok(value)
    }

    /// Encodes `value` as the payload of an attribute named by `name_index`.
    /// # Errors
    /// See [`GenerationError`] for more information.
    pub fn encode<T: ToWriter + ?Sized>(name_index: u16, value: &T) -> Result<Self, GenerationError> {
        let mut info = Vec::new();
        value.to_writer(&mut info)?;
        Ok(Self { name_index, info })
    }
}

/// Finds the attribute with the given name.
/// # Errors
/// Returns [`ParseError`] if the name of an attribute cannot be resolved.
pub fn find_attribute<'a>(
    attributes: &'a [AttributeInfo],
    constant_pool: &ConstantPool,
    name: &str,
) -> Result<Option<&'a AttributeInfo>, ParseError> {
    for attribute in attributes {
        if attribute.name(constant_pool)? == name {
            return Ok(Some(attribute));
        }
    }
    Ok(None)
}

impl FromReader for AttributeInfo {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let name_index = reader.read_value()?;
        let length: u32 = reader.read_value()?;
        let length = usize::try_from(length)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let info = read_byte_chunk(reader, length)?;
        Ok(Self { name_index, info })
    }
}

impl ToWriter for AttributeInfo {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        writer.write_all(&self.name_index.to_be_bytes())?;
        write_length::<u32>(writer, self.info.len())?;
        writer.write_all(&self.info)?;
        Ok(())
    }
}

impl FromReader for u16 {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_value()
    }
}

impl ToWriter for u16 {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        writer.write_all(&self.to_be_bytes())?;
        Ok(())
    }
}

/// Lists prefixed by a `u16` count.
macro_rules! impl_u16_list {
    ($($t:ty),*) => {
        $(
            impl FromReader for Vec<$t> {
                fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
                    let count: u16 = reader.read_value()?;
                    (0..count).map(|_| <$t>::from_reader(reader)).collect()
                }
            }

            impl ToWriter for Vec<$t> {
                fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
                    write_length::<u16>(writer, self.len())?;
                    for item in self {
                        item.to_writer(writer)?;
                    }
                    Ok(())
                }
            }
        )*
    };
}

impl_u16_list!(
    u16,
    AttributeInfo,
    ExceptionTableEntry,
    Annotation,
    TypeAnnotation,
    BootstrapMethod,
    LocalVariable
);

/// The `Code` attribute.
#[doc = see_jvm_spec!(4, 7, 3)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    /// The maximum depth of the operand stack.
    pub max_stack: u16,
    /// The number of local variable slots.
    pub max_locals: u16,
    /// The instruction bytes.
    pub code: Vec<u8>,
    /// The exception handlers.
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Nested attributes such as `LineNumberTable` or `StackMapTable`.
    pub attributes: Vec<AttributeInfo>,
}

impl FromReader for Code {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let max_stack = reader.read_value()?;
        let max_locals = reader.read_value()?;
        let code_length: u32 = reader.read_value()?;
        let code_length = usize::try_from(code_length)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let code = read_byte_chunk(reader, code_length)?;
        let exception_table = Vec::from_reader(reader)?;
        let attributes = Vec::from_reader(reader)?;
        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }
}

impl ToWriter for Code {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        writer.write_all(&self.max_stack.to_be_bytes())?;
        writer.write_all(&self.max_locals.to_be_bytes())?;
        write_length::<u32>(writer, self.code.len())?;
        writer.write_all(&self.code)?;
        self.exception_table.to_writer(writer)?;
        self.attributes.to_writer(writer)?;
        Ok(())
    }
}

/// An entry in the exception table of a `Code` attribute.
#[doc = see_jvm_spec!(4, 7, 3)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    /// Start of the protected range, inclusive.
    pub start_pc: u16,
    /// End of the protected range, exclusive.
    pub end_pc: u16,
    /// Start of the handler.
    pub handler_pc: u16,
    /// The caught class, or zero for any.
    pub catch_type: u16,
}

impl FromReader for ExceptionTableEntry {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            start_pc: reader.read_value()?,
            end_pc: reader.read_value()?,
            handler_pc: reader.read_value()?,
            catch_type: reader.read_value()?,
        })
    }
}

impl ToWriter for ExceptionTableEntry {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        writer.write_all(&self.start_pc.to_be_bytes())?;
        writer.write_all(&self.end_pc.to_be_bytes())?;
        writer.write_all(&self.handler_pc.to_be_bytes())?;
        writer.write_all(&self.catch_type.to_be_bytes())?;
        Ok(())
    }
}

/// An annotation.
#[doc = see_jvm_spec!(4, 7, 16)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// The index of the UTF-8 entry holding the field descriptor of the annotation type.
    pub type_index: u16,
    /// The element-value pairs, keyed by the index of the element name.
    pub element_value_pairs: Vec<(u16, ElementValue)>,
}

impl Annotation {
    /// Looks up the descriptor of the annotation type, e.g. `Ljava/lang/Deprecated;`.
    /// # Errors
    /// Returns [`ParseError`] if the type index is not a UTF-8 entry.
    pub fn descriptor<'cp>(&self, constant_pool: &'cp ConstantPool) -> Result<&'cp str, ParseError> {
        constant_pool
            .get_str(self.type_index)
            .context("Invalid annotation type")
    }
}

impl FromReader for Annotation {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let type_index = reader.read_value()?;
        let pair_count: u16 = reader.read_value()?;
        let element_value_pairs = (0..pair_count)
            .map(|_| Ok((reader.read_value()?, ElementValue::from_reader(reader)?)))
            .collect::<io::Result<_>>()?;
        Ok(Self {
            type_index,
            element_value_pairs,
        })
    }
}

impl ToWriter for Annotation {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        writer.write_all(&self.type_index.to_be_bytes())?;
        write_length::<u16>(writer, self.element_value_pairs.len())?;
        for (name_index, value) in &self.element_value_pairs {
            writer.write_all(&name_index.to_be_bytes())?;
            value.to_writer(writer)?;
        }
        Ok(())
    }
}

/// The value of an annotation element.
#[doc = see_jvm_spec!(4, 7, 16)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// A primitive or string constant; the tag is one of `BCDFIJSZs`.
    Const {
        /// The tag.
        tag: u8,
        /// The index of the constant.
        const_value_index: u16,
    },
    /// An enum constant.
    Enum {
        /// The index of the descriptor of the enum type.
        type_name_index: u16,
        /// The index of the simple name of the constant.
        const_name_index: u16,
    },
    /// A class literal.
    Class(u16),
    /// A nested annotation.
    Annotation(Annotation),
    /// An array of values.
    Array(Vec<ElementValue>),
}

impl FromReader for ElementValue {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let tag: u8 = reader.read_value()?;
        let value = match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => Self::Const {
                tag,
                const_value_index: reader.read_value()?,
            },
            b'e' => Self::Enum {
                type_name_index: reader.read_value()?,
                const_name_index: reader.read_value()?,
            },
            b'c' => Self::Class(reader.read_value()?),
            b'@' => Self::Annotation(Annotation::from_reader(reader)?),
            b'[' => {
                let count: u16 = reader.read_value()?;
                let values = (0..count)
                    .map(|_| ElementValue::from_reader(reader))
                    .collect::<io::Result<_>>()?;
                Self::Array(values)
            }
            unexpected => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid element value tag {unexpected}"),
                ));
            }
        };
        Ok(value)
    }
}

impl ToWriter for ElementValue {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        match self {
            Self::Const {
                tag,
                const_value_index,
            } => {
                writer.write_all(&[*tag])?;
                writer.write_all(&const_value_index.to_be_bytes())?;
            }
            Self::Enum {
                type_name_index,
                const_name_index,
            } => {
                writer.write_all(b"e")?;
                writer.write_all(&type_name_index.to_be_bytes())?;
                writer.write_all(&const_name_index.to_be_bytes())?;
            }
            Self::Class(class_info_index) => {
                writer.write_all(b"c")?;
                writer.write_all(&class_info_index.to_be_bytes())?;
            }
            Self::Annotation(annotation) => {
                writer.write_all(b"@")?;
                annotation.to_writer(writer)?;
            }
            Self::Array(values) => {
                writer.write_all(b"[")?;
                write_length::<u16>(writer, values.len())?;
                for value in values {
                    value.to_writer(writer)?;
                }
            }
        }
        Ok(())
    }
}

/// The payload of `RuntimeVisibleParameterAnnotations` and
/// `RuntimeInvisibleParameterAnnotations`: one list of annotations per parameter.
#[doc = see_jvm_spec!(4, 7, 18)]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParameterAnnotations(pub Vec<Vec<Annotation>>);

impl FromReader for ParameterAnnotations {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let parameter_count: u8 = reader.read_value()?;
        let parameters = (0..parameter_count)
            .map(|_| Vec::<Annotation>::from_reader(reader))
            .collect::<io::Result<_>>()?;
        Ok(Self(parameters))
    }
}

impl ToWriter for ParameterAnnotations {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        write_length::<u8>(writer, self.0.len())?;
        for annotations in &self.0 {
            annotations.to_writer(writer)?;
        }
        Ok(())
    }
}

/// A type annotation.
#[doc = see_jvm_spec!(4, 7, 20)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnnotation {
    /// The kind of target, e.g. `0x13` for a field type.
    pub target_type: u8,
    /// Locates the annotated type within the target.
    pub target_info: TargetInfo,
    /// The `(type_path_kind, type_argument_index)` steps into the annotated type.
    pub target_path: Vec<(u8, u8)>,
    /// The annotation itself.
    pub annotation: Annotation,
}

/// The `target_info` union of a [`TypeAnnotation`].
#[doc = see_jvm_spec!(4, 7, 20)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetInfo {
    /// A type parameter of a class or method.
    TypeParameter(u8),
    /// A type in the `extends` or `implements` clause.
    SuperType(u16),
    /// A bound of a type parameter.
    TypeParameterBound(u8, u8),
    /// A field type, a return type or a receiver type.
    Empty,
    /// A formal parameter type.
    FormalParameter(u8),
    /// A type in the `throws` clause.
    Throws(u16),
    /// A local variable type, as `(start_pc, length, index)` ranges.
    LocalVar(Vec<(u16, u16, u16)>),
    /// The type in an exception handler.
    Catch(u16),
    /// A type in an `instanceof`, `new` or method reference expression.
    Offset(u16),
    /// A type argument in a cast, a constructor or a method invocation.
    TypeArgument(u16, u8),
}

impl FromReader for TypeAnnotation {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let target_type: u8 = reader.read_value()?;
        let target_info = match target_type {
            0x00 | 0x01 => TargetInfo::TypeParameter(reader.read_value()?),
            0x10 => TargetInfo::SuperType(reader.read_value()?),
            0x11 | 0x12 => TargetInfo::TypeParameterBound(reader.read_value()?, reader.read_value()?),
            0x13..=0x15 => TargetInfo::Empty,
            0x16 => TargetInfo::FormalParameter(reader.read_value()?),
            0x17 => TargetInfo::Throws(reader.read_value()?),
            0x40 | 0x41 => {
                let count: u16 = reader.read_value()?;
                let table = (0..count)
                    .map(|_| {
                        Ok((
                            reader.read_value()?,
                            reader.read_value()?,
                            reader.read_value()?,
                        ))
                    })
                    .collect::<io::Result<_>>()?;
                TargetInfo::LocalVar(table)
            }
            0x42 => TargetInfo::Catch(reader.read_value()?),
            0x43..=0x46 => TargetInfo::Offset(reader.read_value()?),
            0x47..=0x4B => TargetInfo::TypeArgument(reader.read_value()?, reader.read_value()?),
            unexpected => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid type annotation target type {unexpected:#04x}"),
                ));
            }
        };
        let path_length: u8 = reader.read_value()?;
        let target_path = (0..path_length)
            .map(|_| Ok((reader.read_value()?, reader.read_value()?)))
            .collect::<io::Result<_>>()?;
        let annotation = Annotation::from_reader(reader)?;
        Ok(Self {
            target_type,
            target_info,
            target_path,
            annotation,
        })
    }
}

impl ToWriter for TypeAnnotation {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        writer.write_all(&[self.target_type])?;
        match &self.target_info {
            TargetInfo::TypeParameter(index) | TargetInfo::FormalParameter(index) => {
                writer.write_all(&[*index])?;
            }
            TargetInfo::SuperType(index)
            | TargetInfo::Throws(index)
            | TargetInfo::Catch(index)
            | TargetInfo::Offset(index) => writer.write_all(&index.to_be_bytes())?,
            TargetInfo::TypeParameterBound(parameter, bound) => writer.write_all(&[*parameter, *bound])?,
            TargetInfo::Empty => {}
            TargetInfo::LocalVar(table) => {
                write_length::<u16>(writer, table.len())?;
                for (start_pc, length, index) in table {
                    writer.write_all(&start_pc.to_be_bytes())?;
                    writer.write_all(&length.to_be_bytes())?;
                    writer.write_all(&index.to_be_bytes())?;
                }
            }
            TargetInfo::TypeArgument(offset, index) => {
                writer.write_all(&offset.to_be_bytes())?;
                writer.write_all(&[*index])?;
            }
        }
        write_length::<u8>(writer, self.target_path.len())?;
        for (kind, argument_index) in &self.target_path {
            writer.write_all(&[*kind, *argument_index])?;
        }
        self.annotation.to_writer(writer)
    }
}

/// An entry of the `BootstrapMethods` attribute.
#[doc = see_jvm_spec!(4, 7, 23)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    /// The index of the [`Entry::MethodHandle`](super::constant_pool::Entry::MethodHandle) of
    /// the bootstrap method.
    pub method_ref_index: u16,
    /// The indices of the static arguments.
    pub arguments: Vec<u16>,
}

impl FromReader for BootstrapMethod {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            method_ref_index: reader.read_value()?,
            arguments: Vec::from_reader(reader)?,
        })
    }
}

impl ToWriter for BootstrapMethod {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        writer.write_all(&self.method_ref_index.to_be_bytes())?;
        self.arguments.to_writer(writer)
    }
}

/// An entry of `LocalVariableTable` or `LocalVariableTypeTable`. In the latter the descriptor
/// index points at a signature.
#[doc = see_jvm_spec!(4, 7, 13)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    /// Start of the live range.
    pub start_pc: u16,
    /// Length of the live range.
    pub length: u16,
    /// The index of the variable name.
    pub name_index: u16,
    /// The index of the descriptor or signature.
    pub descriptor_index: u16,
    /// The local variable slot.
    pub index: u16,
}

impl FromReader for LocalVariable {
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            start_pc: reader.read_value()?,
            length: reader.read_value()?,
            name_index: reader.read_value()?,
            descriptor_index: reader.read_value()?,
            index: reader.read_value()?,
        })
    }
}

impl ToWriter for LocalVariable {
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError> {
        writer.write_all(&self.start_pc.to_be_bytes())?;
        writer.write_all(&self.length.to_be_bytes())?;
        writer.write_all(&self.name_index.to_be_bytes())?;
        writer.write_all(&self.descriptor_index.to_be_bytes())?;
        writer.write_all(&self.index.to_be_bytes())?;
        Ok(())
    }
}
