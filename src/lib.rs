#![warn(
    clippy::pedantic,
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms
)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Welcome to `desugar-jar`, a class-file rewriting pipeline that moves supported JVM APIs into
//! static companion classes.
#![doc = include_str!("../README.md")]
//! ## Features
#![doc = document_features::document_features!()]

pub mod desugar;
pub mod jvm;
pub(crate) mod macros;
pub mod types;

/// Test utilities
#[cfg(test)]
pub(crate) mod tests;
