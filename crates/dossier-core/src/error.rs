use std::path::PathBuf;

/// Errors that can occur anywhere in the retrieval core.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary converts to a `miette` report at the boundary.
///
/// # Examples
///
/// ```
/// use dossier_core::DossierError;
///
/// let err = DossierError::Config("missing routing descriptor".into());
/// assert!(err.to_string().contains("missing routing descriptor"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DossierError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or inconsistent configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(dossier::config), help("check .dossier.toml or run 'dossier doctor'"))]
    Config(String),

    /// Embedding backend or response error.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// SQLite storage failure.
    #[error("database error: {0}")]
    Database(String),

    /// A persisted project index is corrupt or inconsistent.
    #[error("index error: {0}")]
    #[diagnostic(code(dossier::index), help("rebuild with 'dossier build'"))]
    Index(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(code(dossier::not_found))]
    FileNotFound(PathBuf),
}
