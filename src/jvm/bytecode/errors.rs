use std::{fmt, io, num::TryFromIntError};

use super::constant_pool;
use crate::types::InvalidDescriptor;

/// An error that occurs during parsing of a class file.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Due to an IO error in the underlying reader.
    #[error("IO error: {0}")]
    IO(#[from] io::Error),
    /// Due to a malformed class file.
    #[error("Malformed class file: {0}")]
    Malformed(String),
}

impl ParseError {
    pub(crate) fn malform(message: impl fmt::Display) -> Self {
        Self::Malformed(message.to_string())
    }
}

impl From<constant_pool::Error> for ParseError {
    fn from(value: constant_pool::Error) -> Self {
        Self::malform(value)
    }
}

impl From<InvalidDescriptor> for ParseError {
    fn from(value: InvalidDescriptor) -> Self {
        Self::malform(value)
    }
}

pub(crate) trait ParsingErrorContext {
    type Output;

    fn context<Message>(self, message: Message) -> Result<Self::Output, ParseError>
    where
        Message: fmt::Display;
}

impl<T, E> ParsingErrorContext for Result<T, E>
where
    E: fmt::Display,
{
    type Output = T;

    fn context<Message>(self, message: Message) -> Result<Self::Output, ParseError>
    where
        Message: fmt::Display,
    {
        self.map_err(|err| ParseError::malform(format!("{message}: {err}")))
    }
}

impl<T> ParsingErrorContext for Option<T> {
    type Output = T;

    fn context<Message>(self, message: Message) -> Result<Self::Output, ParseError>
    where
        Message: fmt::Display,
    {
        self.ok_or_else(|| ParseError::malform(message))
    }
}

/// An error that occurs during generation of a class file.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Due to an IO error in the underlying writer.
    #[error("IO error: {0}")]
    IO(#[from] io::Error),
    /// The length of a list is beyond the max value of the data type that stores it.
    /// For instance, a method with more than 65535 attributes.
    #[error("Out of range error: {0}")]
    OutOfRange(#[from] TryFromIntError),
    /// An error when operating the constant pool.
    #[error("Constant pool error: {0}")]
    ConstantPool(#[from] constant_pool::Error),
}
