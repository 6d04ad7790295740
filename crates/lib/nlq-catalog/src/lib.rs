//! Tool catalog models and cue tables for nlq-mcp.
//!
//! This crate defines the canonical description of a remote operation shared by
//! the registry, classifier, extractor, and formatter, along with the static
//! category cue tables and the text normalization every stage agrees on.

pub mod models;
pub mod schema;
pub mod text;

pub use models::*;
