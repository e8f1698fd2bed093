//! JVM elements: class files, access flags and member keys.

use std::fmt::Display;

use itertools::Itertools;

pub mod access_flags;
pub mod bytecode;
mod member_key;

pub use member_key::ClassMemberKey;

/// A string in the JVM bytecode.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum JavaString {
    /// A valid UTF-8 string.
    ValidUtf8(String),
    /// An string that is not valid UTF-8.
    InvalidUtf8(Vec<u8>),
}

impl Display for JavaString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JavaString::ValidUtf8(value) => write!(f, "String(\"{value}\")"),
            JavaString::InvalidUtf8(value) => write!(
                f,
                "String({}) // Invalid UTF-8",
                value.iter().map(|it| format!("0x{it:02X}")).join(" ")
            ),
        }
    }
}
