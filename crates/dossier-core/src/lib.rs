//! Core types, configuration, and error handling for Dossier.
//!
//! This crate provides the shared foundation used by all other Dossier crates:
//! - [`DossierError`]: unified error type using `thiserror`
//! - [`DossierConfig`]: configuration loaded from `.dossier.toml`
//! - Shared types: [`Chunk`], [`ChunkKind`], [`RetrievedChunk`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    DossierConfig, EmbeddingConfig, IngestConfig, ProjectConfig, RetrievalConfig,
};
pub use error::DossierError;
pub use types::{Chunk, ChunkKind, OutputFormat, RetrievedChunk};

/// A convenience `Result` type for Dossier operations.
pub type Result<T> = std::result::Result<T, DossierError>;
