use std::collections::HashSet;
use std::path::{Path, PathBuf};

use dossier_core::{DossierError, IngestConfig};

/// Maximum file size to process (1 MB).
const MAX_FILE_SIZE: u64 = 1_048_576;

/// Number of bytes to check for binary detection.
const BINARY_CHECK_SIZE: usize = 8192;

/// Extensions handled by the document-section extractor.
const DOCUMENT_EXTENSIONS: &[&str] = &["md", "markdown"];

/// A file discovered under a project root.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use dossier_ingest::walker::{FileKind, Language, ProjectFile};
///
/// let file = ProjectFile {
///     path: PathBuf::from("/repo/src/train.py"),
///     relative: PathBuf::from("src/train.py"),
///     kind: FileKind::Code(Language::Python),
///     content: "def fit(): pass".to_string(),
/// };
/// assert_eq!(file.kind, FileKind::Code(Language::Python));
/// ```
#[derive(Debug, Clone)]
pub struct ProjectFile {
    /// Path as reached from the walk root (absolute if the root was).
    pub path: PathBuf,
    /// Path relative to the walk root.
    pub relative: PathBuf,
    /// Which extractor handles this file.
    pub kind: FileKind,
    /// Full file content.
    pub content: String,
}

/// Result of walking one project root.
#[derive(Debug, Clone, Default)]
pub struct ProjectWalk {
    /// Readable text files, sorted by relative path.
    pub files: Vec<ProjectFile>,
    /// Candidate files that could not be read, sorted.
    pub unreadable: Vec<PathBuf>,
}

/// How a walked file is chunked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Markdown-like document, split on headings.
    Document,
    /// Source code, split into functions.
    Code(Language),
}

impl FileKind {
    /// Classify a file extension (without the dot). `None` if no extractor applies.
    ///
    /// # Examples
    ///
    /// ```
    /// use dossier_ingest::walker::{FileKind, Language};
    ///
    /// assert_eq!(FileKind::from_extension("md"), Some(FileKind::Document));
    /// assert_eq!(FileKind::from_extension("py"), Some(FileKind::Code(Language::Python)));
    /// assert_eq!(FileKind::from_extension("csv"), None);
    /// ```
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
            return Some(FileKind::Document);
        }
        match Language::from_extension(&ext) {
            Language::Unknown => None,
            language => Some(FileKind::Code(language)),
        }
    }
}

/// Programming language detected from file extension.
///
/// # Examples
///
/// ```
/// use dossier_ingest::walker::Language;
///
/// assert_eq!(Language::from_extension("rs"), Language::Rust);
/// assert_eq!(Language::from_extension("py"), Language::Python);
/// assert_eq!(Language::from_extension("java"), Language::Java);
/// assert_eq!(Language::from_extension("cpp"), Language::Cpp);
/// assert_eq!(Language::from_extension("rb"), Language::Ruby);
/// assert_eq!(Language::from_extension("txt"), Language::Unknown);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    JavaScript,
    Go,
    Java,
    C,
    Cpp,
    Ruby,
    Unknown,
}

impl Language {
    /// Detect language from a file extension string (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "rs" => Language::Rust,
            "py" => Language::Python,
            "ts" | "tsx" => Language::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
            "rb" => Language::Ruby,
            _ => Language::Unknown,
        }
    }

    /// Get the tree-sitter language grammar for this language.
    ///
    /// Returns `None` for `Language::Unknown`.
    pub fn tree_sitter_language(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Language::C => Some(tree_sitter_c::LANGUAGE.into()),
            Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
            Language::Ruby => Some(tree_sitter_ruby::LANGUAGE.into()),
            Language::Unknown => None,
        }
    }
}

/// Walk a project root, returning the files the extractors should read.
///
/// Directories named in `ingest.exclude_dirs` are pruned wherever they
/// appear. Only files whose extension is listed in
/// `ingest.include_extensions` and that some extractor understands are
/// returned. Binary files and files larger than 1 MB are skipped. Content
/// that is not valid UTF-8 is decoded lossily. Dot-directories are walked
/// unless excluded by name. Output is sorted by relative path so builds are
/// reproducible; files whose content cannot be read are listed in
/// [`ProjectWalk::unreadable`].
///
/// # Errors
///
/// Returns [`DossierError::FileNotFound`] if `root` does not exist.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use dossier_core::IngestConfig;
/// use dossier_ingest::walker::walk_project;
///
/// let walk = walk_project(Path::new("."), &IngestConfig::default()).unwrap();
/// for f in &walk.files {
///     println!("{}: {:?}", f.relative.display(), f.kind);
/// }
/// ```
pub fn walk_project(root: &Path, ingest: &IngestConfig) -> Result<ProjectWalk, DossierError> {
    if !root.exists() {
        return Err(DossierError::FileNotFound(root.to_path_buf()));
    }

    let included: HashSet<String> = ingest
        .include_extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();
    let excluded: HashSet<String> = ingest.exclude_dirs.iter().cloned().collect();

    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(ingest.respect_gitignore)
        .git_exclude(ingest.respect_gitignore)
        .git_global(ingest.respect_gitignore)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir
                && entry.depth() > 0
                && excluded.contains(entry.file_name().to_string_lossy().as_ref()))
        })
        .build();

    let mut walk = ProjectWalk::default();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("skipping unreadable walk entry: {e}");
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();

        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(e) => e.to_ascii_lowercase(),
            None => continue,
        };
        if !included.contains(&ext) {
            continue;
        }
        let Some(kind) = FileKind::from_extension(&ext) else {
            tracing::debug!("no extractor for {}", path.display());
            continue;
        };

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("cannot stat {}: {e}", path.display());
                walk.unreadable.push(path.to_path_buf());
                continue;
            }
        };
        if metadata.len() > MAX_FILE_SIZE {
            tracing::debug!("skipping oversized file {}", path.display());
            continue;
        }

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!("cannot read {}: {e}", path.display());
                walk.unreadable.push(path.to_path_buf());
                continue;
            }
        };

        // Null bytes in the first 8KB mean binary content
        let check_len = bytes.len().min(BINARY_CHECK_SIZE);
        if bytes[..check_len].contains(&0) {
            continue;
        }
        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("{} is not valid UTF-8, decoding lossily", path.display());
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        let relative = match path.strip_prefix(root) {
            Ok(r) => r.to_path_buf(),
            Err(_) => path.to_path_buf(),
        };

        walk.files.push(ProjectFile {
            path: path.to_path_buf(),
            relative,
            kind,
            content,
        });
    }

    walk.files.sort_by(|a, b| a.relative.cmp(&b.relative));
    walk.unreadable.sort();

    Ok(walk)
}
