//! The desugaring pipeline.
//!
//! A run goes through three phases driven by [`JarFileClassEntrySelector`]:
//! 1. class entries of the input archive are matched against top-level type patterns;
//! 2. every class is handed to the [`PreScanner`], which computes the replacement maps
//!    returned as an [`Analysis`];
//! 3. every entry is written to the output archive, with companion classes generated by
//!    [`generate_companion`] and class files rewritten by the passes in [`annotation_filter`],
//!    [`invocation_site`] and [`type_replacement`].

use std::io;

use crate::{
    jvm::{
        ClassMemberKey,
        bytecode::{GenerationError, ParseError, constant_pool},
    },
    types::InvalidDescriptor,
};

pub mod annotation_filter;
mod companion;
pub mod config;
pub mod helpers;
pub mod invocation_site;
mod pre_scanner;
mod selector;
pub mod type_replacement;

pub use companion::generate_companion;
pub use config::{BuildConfig, DesugarOptions, UnselectedClassPolicy};
pub use pre_scanner::{Analysis, PreScanner};
pub use selector::{JarFileClassEntrySelector, Phase, match_top_level_types};

/// An error that aborts a desugaring run.
#[derive(Debug, thiserror::Error)]
pub enum DesugarError {
    /// Reading the input or writing the output failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The archive container is broken.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    /// The fixed entry timestamp cannot be represented.
    #[error("Invalid entry timestamp: {0}")]
    Timestamp(#[from] zip::result::DateTimeRangeError),
    /// A class entry is not a well-formed class file.
    #[error("Failed to parse class file: {0}")]
    Parse(#[from] ParseError),
    /// A rewritten class cannot be serialized.
    #[error("Failed to generate class file: {0}")]
    Generation(#[from] GenerationError),
    /// A rewrite ran out of constant pool space or hit a malformed entry.
    #[error("Constant pool error: {0}")]
    ConstantPool(#[from] constant_pool::Error),
    /// A descriptor cannot be parsed.
    #[error(transparent)]
    Descriptor(#[from] InvalidDescriptor),
    /// A field carrying a supported-API annotation is not `static final`.
    #[error("Supported field {0} must be static final")]
    NonConstantSupportedField(ClassMemberKey),
    /// A method selected for relocation has no body to copy.
    #[error("Method {0} is abstract or native and cannot be relocated")]
    NoMethodBody(ClassMemberKey),
    /// A method selected for relocation cannot live in a companion class.
    #[error("Method {key} cannot be relocated: {reason}")]
    UnrelocatableMethod {
        /// The method.
        key: ClassMemberKey,
        /// Why it cannot be relocated.
        reason: &'static str,
    },
    /// A copied method body creates a lambda in a way the companion cannot express.
    #[error("Unsupported lambda bootstrap in {class}: {reason}")]
    UnsupportedBootstrap {
        /// The base class.
        class: String,
        /// What is wrong with the bootstrap.
        reason: String,
    },
    /// Some top-level type patterns matched no class entry.
    #[error("Top-level type patterns matched no entry: {}", .0.join(", "))]
    UnmatchedPattern(Vec<String>),
    /// The build configuration name is unknown.
    #[error("Unexpected build config: {0}")]
    UnknownConfig(String),
    /// A phase of the selector was invoked out of order.
    #[error("Expected the selector to be {expected}, but it is {found}")]
    OutOfOrder {
        /// The phase the call requires.
        expected: Phase,
        /// The phase the selector is in.
        found: Phase,
    },
}
