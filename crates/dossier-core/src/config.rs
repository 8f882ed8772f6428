use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DossierError;

/// Top-level configuration loaded from `.dossier.toml`.
///
/// Loading runs [`DossierConfig::validate`], so a config with a project that
/// lacks a routing descriptor never reaches the index builder or the router.
///
/// # Examples
///
/// ```
/// use dossier_core::DossierConfig;
///
/// let config = DossierConfig::default();
/// assert_eq!(config.retrieval.top_k, 5);
/// assert!(config.projects.is_empty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DossierConfig {
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// File traversal and chunking settings.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Query-time retrieval limits.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Indexed projects, in routing tie-break order.
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
    /// Project id to free-text domain description.
    #[serde(default)]
    pub routing: HashMap<String, String>,
}

impl DossierConfig {
    /// Load and validate configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Io`] if the file cannot be read,
    /// [`DossierError::Toml`] if the content is not valid TOML, or
    /// [`DossierError::Config`] if validation fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dossier_core::DossierConfig;
    /// use std::path::Path;
    ///
    /// let config = DossierConfig::from_file(Path::new(".dossier.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, DossierError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Toml`] if parsing fails, or
    /// [`DossierError::Config`] if validation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use dossier_core::DossierConfig;
    ///
    /// let toml = r#"
    /// [[projects]]
    /// id = "ocr_pipeline"
    /// root = "projects/ocr_pipeline"
    /// index_dir = "indexes/ocr_pipeline"
    ///
    /// [routing]
    /// ocr_pipeline = "OCR, YOLO, document understanding"
    /// "#;
    /// let config = DossierConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.projects[0].id, "ocr_pipeline");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, DossierError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency.
    ///
    /// Every project must have a non-empty, unique id and a routing
    /// descriptor. Routing entries naming no project are tolerated with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), DossierError> {
        let mut seen = HashSet::new();
        for project in &self.projects {
            if project.id.trim().is_empty() {
                return Err(DossierError::Config("project id must not be empty".into()));
            }
            if !seen.insert(project.id.as_str()) {
                return Err(DossierError::Config(format!(
                    "duplicate project id '{}'",
                    project.id
                )));
            }
        }

        let missing: Vec<&str> = self
            .projects
            .iter()
            .map(|p| p.id.as_str())
            .filter(|id| !self.routing.contains_key(*id))
            .collect();
        if !missing.is_empty() {
            return Err(DossierError::Config(format!(
                "projects missing a [routing] descriptor: {}",
                missing.join(", ")
            )));
        }

        let mut extra: Vec<&str> = self
            .routing
            .keys()
            .map(String::as_str)
            .filter(|id| !seen.contains(id))
            .collect();
        if !extra.is_empty() {
            extra.sort_unstable();
            tracing::warn!(
                "routing descriptors for unknown projects are ignored: {}",
                extra.join(", ")
            );
        }

        self.retrieval.validate()?;

        if self.embedding.dimensions == 0 {
            return Err(DossierError::Config(
                "embedding.dimensions must be positive".into(),
            ));
        }
        if self.embedding.provider == "voyage"
            && !VOYAGE_DIMENSIONS.contains(&self.embedding.dimensions)
        {
            return Err(DossierError::Config(format!(
                "voyage embeddings support dimensions 256, 512, 1024 or 2048, got {}; set embedding.dimensions = 1024",
                self.embedding.dimensions
            )));
        }

        Ok(())
    }

    /// Make relative project roots and index directories relative to `base`.
    ///
    /// # Examples
    ///
    /// ```
    /// use dossier_core::DossierConfig;
    /// use std::path::Path;
    ///
    /// let mut config = DossierConfig::from_toml(r#"
    /// [[projects]]
    /// id = "ocr"
    /// root = "projects/ocr"
    /// index_dir = "/var/indexes/ocr"
    ///
    /// [routing]
    /// ocr = "OCR"
    /// "#).unwrap();
    /// config.resolve_paths(Path::new("/srv/portfolio"));
    /// assert_eq!(config.projects[0].root, Path::new("/srv/portfolio/projects/ocr"));
    /// assert_eq!(config.projects[0].index_dir, Path::new("/var/indexes/ocr"));
    /// ```
    pub fn resolve_paths(&mut self, base: &Path) {
        for project in &mut self.projects {
            if project.root.is_relative() {
                project.root = base.join(&project.root);
            }
            if project.index_dir.is_relative() {
                project.index_dir = base.join(&project.index_dir);
            }
        }
    }

    /// Look up a project by id.
    pub fn project(&self, id: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Routing descriptor for a project.
    pub fn descriptor(&self, id: &str) -> Option<&str> {
        self.routing.get(id).map(String::as_str)
    }
}

/// One indexed project.
///
/// # Examples
///
/// ```
/// use dossier_core::ProjectConfig;
/// use std::path::PathBuf;
///
/// let project = ProjectConfig {
///     id: "ml_category_classifier".into(),
///     display_name: Some("ML Classifier".into()),
///     root: PathBuf::from("projects/ml_category_classifier"),
///     index_dir: PathBuf::from("indexes/ml_classifier"),
/// };
/// assert_eq!(project.label(), "ML Classifier");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Stable identifier, also the key into `[routing]`.
    pub id: String,
    /// UI-facing label.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Root of the project's documentation and sources.
    pub root: PathBuf,
    /// Directory the project's index artifacts are written to.
    pub index_dir: PathBuf,
}

impl ProjectConfig {
    /// Display name, falling back to the id.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

/// Configuration for embedding providers.
///
/// # Examples
///
/// ```
/// use dossier_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "hashing");
/// assert_eq!(config.model, "hashing-v1");
/// assert_eq!(config.dimensions, 384);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider (`"hashing"` or `"voyage"`).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// API key for remote providers.
    pub api_key: Option<String>,
    /// Custom base URL for remote providers.
    pub base_url: Option<String>,
    /// Embedding dimensions (default: 384). Voyage accepts 256, 512, 1024
    /// or 2048.
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
}

fn default_embedding_provider() -> String {
    "hashing".into()
}

fn default_embedding_model() -> String {
    "hashing-v1".into()
}

/// Output sizes the Voyage API can return.
const VOYAGE_DIMENSIONS: &[usize] = &[256, 512, 1024, 2048];

fn default_embedding_dimensions() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key: None,
            base_url: None,
            dimensions: default_embedding_dimensions(),
        }
    }
}

/// File traversal and chunking settings.
///
/// # Examples
///
/// ```
/// use dossier_core::IngestConfig;
///
/// let config = IngestConfig::default();
/// assert!(config.include_extensions.contains(&"py".to_string()));
/// assert!(config.exclude_dirs.contains(&".venv".to_string()));
/// assert_eq!(config.folder_tree_depth, 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// File extensions (without the dot) that are read at all.
    #[serde(default = "default_include_extensions")]
    pub include_extensions: Vec<String>,
    /// Directory names pruned anywhere in the tree.
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    /// Emit a folder-structure chunk per project.
    #[serde(default = "default_true")]
    pub folder_tree: bool,
    /// Maximum depth rendered in the folder-structure chunk.
    #[serde(default = "default_folder_tree_depth")]
    pub folder_tree_depth: usize,
    /// Honour `.gitignore` files while walking.
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

fn default_include_extensions() -> Vec<String> {
    vec!["md".into(), "py".into()]
}

fn default_exclude_dirs() -> Vec<String> {
    [
        ".venv",
        "__pycache__",
        "data",
        "models",
        "outputs",
        ".git",
        ".idea",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_true() -> bool {
    true
}

fn default_folder_tree_depth() -> usize {
    4
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_extensions: default_include_extensions(),
            exclude_dirs: default_exclude_dirs(),
            folder_tree: true,
            folder_tree_depth: default_folder_tree_depth(),
            respect_gitignore: true,
        }
    }
}

/// Query-time retrieval limits.
///
/// # Examples
///
/// ```
/// use dossier_core::RetrievalConfig;
///
/// let config = RetrievalConfig::default();
/// assert_eq!(config.top_k, 5);
/// assert_eq!(config.per_project_top_k, 3);
/// assert_eq!(config.select_count, 3);
/// assert_eq!(config.max_chunks, 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Results per query in single-project mode.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Results per selected project in routed mode.
    #[serde(default = "default_per_project_top_k")]
    pub per_project_top_k: usize,
    /// Number of projects selected by routing.
    #[serde(default = "default_select_count")]
    pub select_count: usize,
    /// Hard cap on chunks handed to context assembly.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_per_project_top_k() -> usize {
    3
}

fn default_select_count() -> usize {
    3
}

fn default_max_chunks() -> usize {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            per_project_top_k: default_per_project_top_k(),
            select_count: default_select_count(),
            max_chunks: default_max_chunks(),
        }
    }
}

impl RetrievalConfig {
    fn validate(&self) -> Result<(), DossierError> {
        let fields = [
            ("top_k", self.top_k),
            ("per_project_top_k", self.per_project_top_k),
            ("select_count", self.select_count),
            ("max_chunks", self.max_chunks),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(DossierError::Config(format!(
                    "retrieval.{name} must be positive"
                )));
            }
        }
        Ok(())
    }
}
