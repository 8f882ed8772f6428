use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category tag of a [`Chunk`], serialized as the chunk's `type` field.
///
/// # Examples
///
/// ```
/// use dossier_core::ChunkKind;
///
/// let kind: ChunkKind = serde_json::from_str("\"folder_tree\"").unwrap();
/// assert_eq!(kind, ChunkKind::FolderTree);
/// assert_eq!(ChunkKind::default(), ChunkKind::Other);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Rendered directory structure of a project.
    FolderTree,
    /// A heading-delimited section of a markdown document.
    Section,
    /// A single function or method definition.
    Function,
    /// Anything else, including records written without a type.
    #[default]
    #[serde(other)]
    Other,
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKind::FolderTree => write!(f, "folder_tree"),
            ChunkKind::Section => write!(f, "section"),
            ChunkKind::Function => write!(f, "function"),
            ChunkKind::Other => write!(f, "other"),
        }
    }
}

/// The atomic retrievable unit: non-empty text plus provenance.
///
/// Chunks are created once during an index build and never mutated after
/// they are persisted. Construct them with [`Chunk::new`], which refuses
/// empty text.
///
/// # Examples
///
/// ```
/// use dossier_core::{Chunk, ChunkKind};
///
/// let chunk = Chunk::new("ocr", "README.md", ChunkKind::Section, "  Hello world.\n")
///     .unwrap()
///     .with_section_title("Title");
/// assert_eq!(chunk.text, "Hello world.");
/// assert_eq!(chunk.section_title.as_deref(), Some("Title"));
///
/// assert!(Chunk::new("ocr", "README.md", ChunkKind::Section, " \n ").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Trimmed, non-empty content.
    pub text: String,
    /// Owning project identifier.
    pub project: String,
    /// Provenance label, e.g. `"train.py::fit"` or `"README.md"`.
    pub source: String,
    /// Category tag.
    #[serde(rename = "type", default)]
    pub kind: ChunkKind,
    /// Heading the chunk was found under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    /// Function name for function chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Absolute path of the originating file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// First line of the chunk (1-indexed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    /// Last line of the chunk (1-indexed, inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
}

impl Chunk {
    /// Create a chunk, trimming `text`. Returns `None` if nothing is left.
    pub fn new(
        project: impl Into<String>,
        source: impl Into<String>,
        kind: ChunkKind,
        text: &str,
    ) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            project: project.into(),
            source: source.into(),
            kind,
            section_title: None,
            symbol: None,
            file: None,
            start_line: None,
            end_line: None,
        })
    }

    /// Set the section heading.
    pub fn with_section_title(mut self, title: impl Into<String>) -> Self {
        self.section_title = Some(title.into());
        self
    }

    /// Set the function name.
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Set the originating file path.
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Set the 1-indexed inclusive line span.
    pub fn with_lines(mut self, start_line: u32, end_line: u32) -> Self {
        self.start_line = Some(start_line);
        self.end_line = Some(end_line);
        self
    }
}

/// A chunk annotated at query time with the project it was retrieved from.
///
/// Transient: built while assembling context, never persisted.
///
/// # Examples
///
/// ```
/// use dossier_core::{Chunk, ChunkKind, RetrievedChunk};
///
/// let chunk = Chunk::new("ocr", "README.md", ChunkKind::Section, "Uses YOLO.").unwrap();
/// let hit = RetrievedChunk::new("ocr", chunk);
/// assert_eq!(hit.project, "ocr");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Project the chunk was retrieved from.
    pub project: String,
    /// The retrieved chunk.
    pub chunk: Chunk,
}

impl RetrievedChunk {
    /// Tag `chunk` with `project`.
    pub fn new(project: impl Into<String>, chunk: Chunk) -> Self {
        Self {
            project: project.into(),
            chunk,
        }
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use dossier_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "markdown".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn output_format_default_is_text() {
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
    }

    #[test]
    fn chunk_serializes_type_field_and_omits_absent_fields() {
        let chunk = Chunk::new("ml", "README.md", ChunkKind::Section, "Body")
            .unwrap()
            .with_section_title("Overview");
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["type"], "section");
        assert_eq!(json["section_title"], "Overview");
        assert!(json.get("symbol").is_none());
        assert!(json.get("file").is_none());
        assert!(json.get("start_line").is_none());
    }

    #[test]
    fn chunk_without_type_deserializes_as_other() {
        let json = r#"{"text": "x", "project": "p", "source": "notes"}"#;
        let chunk: Chunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.kind, ChunkKind::Other);
        assert!(chunk.section_title.is_none());
    }

    #[test]
    fn unknown_type_deserializes_as_other() {
        let json = r#"{"text": "x", "project": "p", "source": "s", "type": "class"}"#;
        let chunk: Chunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.kind, ChunkKind::Other);
    }

    #[test]
    fn function_chunk_carries_symbol_file_and_lines() {
        let chunk = Chunk::new("ml", "train.py::fit", ChunkKind::Function, "def fit():\n    pass")
            .unwrap()
            .with_symbol("fit")
            .with_file("/repo/train.py")
            .with_lines(3, 4);
        assert_eq!(chunk.symbol.as_deref(), Some("fit"));
        assert_eq!(chunk.file, Some(PathBuf::from("/repo/train.py")));
        assert_eq!((chunk.start_line, chunk.end_line), (Some(3), Some(4)));
    }

    #[test]
    fn chunk_kind_display_matches_serde() {
        for kind in [
            ChunkKind::FolderTree,
            ChunkKind::Section,
            ChunkKind::Function,
            ChunkKind::Other,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }
}
