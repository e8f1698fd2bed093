//! Reading and writing of the JVM class file format.
//!
//! The model is deliberately close to the bytes: constant pool indices are kept as they are and
//! attributes stay raw until a pass decodes the one it owns. Writing back an untouched class
//! therefore reproduces the input byte for byte.
pub mod attributes;
pub mod class_file;
pub mod constant_pool;
mod errors;
pub mod instruction;
mod reader_utils;

use std::{
    io::{self, Read, Write},
    num::TryFromIntError,
};

pub use class_file::{ClassFile, FieldInfo, MethodInfo};
pub use constant_pool::ConstantPool;
pub use errors::{GenerationError, ParseError};
use num_traits::ToBytes;

/// Trait for reading a raw JVM element from a reader.
pub trait FromReader {
    /// Reads the element from the given reader.
    ///
    /// # Errors
    /// Forwards the error of the underlying reader, or reports data that does not form a valid
    /// element as [`io::ErrorKind::InvalidData`].
    fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self>
    where
        Self: Sized;
}

/// Trait for writing a raw JVM element to a writer.
pub trait ToWriter {
    /// Writes the raw JVM element to the given writer.
    ///
    /// # Errors
    /// See [`GenerationError`] for more information.
    fn to_writer<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), GenerationError>;
}

fn write_length<Len>(writer: &mut (impl Write + ?Sized), length: usize) -> Result<(), GenerationError>
where
    usize: TryInto<Len, Error = TryFromIntError>,
    Len: ToBytes,
    <Len as ToBytes>::Bytes: IntoIterator<Item = u8>,
{
    let length: Len = length.try_into()?;
    writer.write_all(length.to_be_bytes().as_ref())?;
    Ok(())
}
