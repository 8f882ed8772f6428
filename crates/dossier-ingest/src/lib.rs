//! Chunk extraction from raw project artifacts.
//!
//! Turns markdown documents into heading-delimited section chunks, source
//! files into function-level chunks (via tree-sitter), and a project
//! directory into a single folder-structure chunk. The [`walker`] decides
//! which files are read at all.

pub mod code;
pub mod markdown;
pub mod tree;
pub mod walker;
