//! Field types and their descriptors.

use std::str::FromStr;

use itertools::Itertools;

use super::{Descriptor, InvalidDescriptor};
use crate::macros::see_jvm_spec;

/// A primitive type in Java.
#[doc = see_jvm_spec!(4, 3, 2)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum PrimitiveType {
    /// The `boolean` type.
    Boolean,
    /// The `char` type.
    Char,
    /// The `float` type.
    Float,
    /// The `double` type.
    Double,
    /// The `byte` type.
    Byte,
    /// The `short` type.
    Short,
    /// The `int` type.
    Int,
    /// The `long` type.
    Long,
}

impl TryFrom<char> for PrimitiveType {
    type Error = InvalidDescriptor;

    fn try_from(descriptor: char) -> Result<Self, Self::Error> {
        match descriptor {
            'Z' => Ok(Self::Boolean),
            'C' => Ok(Self::Char),
            'F' => Ok(Self::Float),
            'D' => Ok(Self::Double),
            'B' => Ok(Self::Byte),
            'S' => Ok(Self::Short),
            'I' => Ok(Self::Int),
            'J' => Ok(Self::Long),
            other => Err(InvalidDescriptor(other.to_string())),
        }
    }
}

impl PrimitiveType {
    /// Returns the single-character descriptor of the primitive type.
    #[must_use]
    pub const fn descriptor_char(self) -> char {
        match self {
            Self::Boolean => 'Z',
            Self::Char => 'C',
            Self::Float => 'F',
            Self::Double => 'D',
            Self::Byte => 'B',
            Self::Short => 'S',
            Self::Int => 'I',
            Self::Long => 'J',
        }
    }
}

/// A field type, as it appears in field and method descriptors.
#[doc = see_jvm_spec!(4, 3, 2)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub enum FieldType {
    /// A primitive type.
    Base(PrimitiveType),
    /// A class or interface, identified by its internal binary name (e.g. `java/lang/String`).
    Object(String),
    /// An array type with the given element type.
    Array(Box<FieldType>),
}

impl FieldType {
    /// Wraps this type into an array type.
    #[must_use]
    pub fn into_array_type(self) -> Self {
        Self::Array(Box::new(self))
    }

    /// Replaces every class name in this type for which `mapper` returns a new name.
    #[must_use]
    pub fn remap<F>(&self, mapper: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            Self::Base(it) => Self::Base(*it),
            Self::Object(name) => Self::Object(mapper(name).unwrap_or_else(|| name.clone())),
            Self::Array(element) => element.remap(mapper).into_array_type(),
        }
    }

    /// Parses a single field type from the front of `remaining` and advances it.
    pub(crate) fn parse_prefix(remaining: &mut std::str::Chars<'_>) -> Result<Self, InvalidDescriptor> {
        let prefix = remaining
            .next()
            .ok_or_else(|| InvalidDescriptor(String::new()))?;
        match prefix {
            'L' => {
                let binary_name: String = remaining.take_while_ref(|c| *c != ';').collect();
                match remaining.next() {
                    Some(';') if !binary_name.is_empty() => Ok(Self::Object(binary_name)),
                    _ => Err(InvalidDescriptor(format!("L{binary_name}"))),
                }
            }
            '[' => Self::parse_prefix(remaining).map(Self::into_array_type),
            other => PrimitiveType::try_from(other).map(Self::Base),
        }
    }
}

impl Descriptor for FieldType {
    fn descriptor(&self) -> String {
        match self {
            Self::Base(it) => it.descriptor_char().to_string(),
            Self::Object(binary_name) => format!("L{binary_name};"),
            Self::Array(element) => format!("[{}", element.descriptor()),
        }
    }
}

impl FromStr for FieldType {
    type Err = InvalidDescriptor;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let mut chars = descriptor.chars();
        let field_type =
            Self::parse_prefix(&mut chars).map_err(|_| InvalidDescriptor(descriptor.to_owned()))?;
        if chars.next().is_some() {
            return Err(InvalidDescriptor(descriptor.to_owned()));
        }
        Ok(field_type)
    }
}
