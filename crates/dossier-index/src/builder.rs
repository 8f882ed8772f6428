//! Offline per-project index builds.
//!
//! A build collects every chunk of one project, embeds them and writes the
//! `(chunks.json, vectors.db)` pair. Both artifacts are written to a
//! temporary sibling and renamed into place, chunks first.

use std::fs;
use std::path::{Path, PathBuf};

use dossier_core::{Chunk, DossierConfig, DossierError, IngestConfig};
use dossier_ingest::code::extract_functions;
use dossier_ingest::markdown::extract_sections;
use dossier_ingest::tree::folder_tree_chunk;
use dossier_ingest::walker::{walk_project, FileKind};
use serde::{Deserialize, Serialize};

use crate::embedding::Embedder;
use crate::flat::FlatIndex;

/// File name of the chunk metadata artifact.
pub const CHUNKS_FILE: &str = "chunks.json";

/// File name of the vector index artifact.
pub const INDEX_FILE: &str = "vectors.db";

/// Outcome of one project build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    /// Project id.
    pub project: String,
    /// Candidate files found by the walker.
    pub files_scanned: usize,
    /// Files that produced no chunks because they could not be read or parsed.
    pub files_skipped: usize,
    /// Chunks written.
    pub chunks: usize,
    /// Vector dimensionality of the index.
    pub dimensions: usize,
    /// Path of the written `chunks.json`.
    pub chunks_path: PathBuf,
    /// Path of the written `vectors.db`.
    pub index_path: PathBuf,
}

/// Chunks gathered from one project, before embedding.
#[derive(Debug, Default)]
pub struct CollectedChunks {
    /// Chunks in extraction order.
    pub chunks: Vec<Chunk>,
    /// Candidate files found by the walker.
    pub files_scanned: usize,
    /// Files that could not be read or parsed.
    pub files_skipped: usize,
}

/// Gather a project's chunks: folder tree first, then each file in path order.
///
/// A missing root is logged and yields nothing.
///
/// # Errors
///
/// Returns [`DossierError::Io`] if the root exists but cannot be resolved.
pub fn collect_chunks(
    project: &str,
    root: &Path,
    ingest: &IngestConfig,
) -> Result<CollectedChunks, DossierError> {
    if !root.exists() {
        tracing::warn!(
            "project '{project}' root {} does not exist, building an empty index",
            root.display()
        );
        return Ok(CollectedChunks::default());
    }
    let root = root.canonicalize()?;

    let mut collected = CollectedChunks::default();
    collected
        .chunks
        .extend(folder_tree_chunk(project, &root, ingest));

    let walk = walk_project(&root, ingest)?;
    for path in &walk.unreadable {
        tracing::warn!("skipping unreadable file {}", path.display());
    }
    collected.files_scanned += walk.unreadable.len();
    collected.files_skipped += walk.unreadable.len();

    for file in walk.files {
        collected.files_scanned += 1;
        match file.kind {
            FileKind::Document => {
                let name = file
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.relative.display().to_string());
                let sections = extract_sections(&name, project, &file.content)
                    .into_iter()
                    .map(|chunk| chunk.with_file(&file.path));
                collected.chunks.extend(sections);
            }
            FileKind::Code(language) => {
                match extract_functions(&file.path, project, &file.content, language) {
                    Some(functions) => collected.chunks.extend(functions),
                    None => collected.files_skipped += 1,
                }
            }
        }
    }

    Ok(collected)
}

/// Build one project's index into `out_dir`.
///
/// # Errors
///
/// Returns [`DossierError::Embedding`] if the embedder fails or returns the
/// wrong number or shape of vectors, and [`DossierError::Io`] or
/// [`DossierError::Database`] if the artifacts cannot be written.
pub fn build_index_for_project(
    project: &str,
    root: &Path,
    out_dir: &Path,
    embedder: &dyn Embedder,
    ingest: &IngestConfig,
) -> Result<BuildReport, DossierError> {
    let collected = collect_chunks(project, root, ingest)?;
    let chunks = collected.chunks;

    let dimensions = embedder.dimensions();
    let mut index = FlatIndex::new(dimensions, embedder.model_id());

    if !chunks.is_empty() {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_documents(&texts)?;
        if vectors.len() != chunks.len() {
            return Err(DossierError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(DossierError::Embedding(format!(
                "embedder returned a {}-dimensional vector, expected {dimensions}",
                bad.len()
            )));
        }
        index.add(&vectors)?;
    }

    fs::create_dir_all(out_dir)?;
    let chunks_path = out_dir.join(CHUNKS_FILE);
    let index_path = out_dir.join(INDEX_FILE);

    let json = serde_json::to_string_pretty(&chunks)?;
    let chunks_tmp = temp_sibling(&chunks_path);
    fs::write(&chunks_tmp, json)?;

    let index_tmp = temp_sibling(&index_path);
    if let Err(e) = index.write(&index_tmp) {
        let _ = fs::remove_file(&chunks_tmp);
        let _ = fs::remove_file(&index_tmp);
        return Err(e);
    }

    fs::rename(&chunks_tmp, &chunks_path)?;
    fs::rename(&index_tmp, &index_path)?;

    tracing::info!(
        "built index for '{project}': {} chunks from {} files ({} skipped)",
        chunks.len(),
        collected.files_scanned,
        collected.files_skipped
    );

    Ok(BuildReport {
        project: project.to_string(),
        files_scanned: collected.files_scanned,
        files_skipped: collected.files_skipped,
        chunks: chunks.len(),
        dimensions,
        chunks_path,
        index_path,
    })
}

/// Build every configured project, in config order.
///
/// # Errors
///
/// Stops at and returns the first failing project's error.
pub fn build_all(
    config: &DossierConfig,
    embedder: &dyn Embedder,
) -> Result<Vec<BuildReport>, DossierError> {
    config
        .projects
        .iter()
        .map(|project| {
            build_index_for_project(
                &project.id,
                &project.root,
                &project.index_dir,
                embedder,
                &config.ingest,
            )
        })
        .collect()
}

/// Read a `chunks.json` written by a build.
///
/// # Errors
///
/// Returns [`DossierError::FileNotFound`] if the file is missing and
/// [`DossierError::Index`] if it is not a chunk list.
pub fn read_chunks(path: &Path) -> Result<Vec<Chunk>, DossierError> {
    if !path.exists() {
        return Err(DossierError::FileNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| DossierError::Index(format!("corrupt chunk list {}: {e}", path.display())))
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use dossier_core::ChunkKind;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "README.md", "# Overview\nReceipt OCR with YOLO.\n# Setup\npip install.\n");
        write(root, "src/detect.py", "def detect(img):\n    return img\n");
        write(root, "src/broken.py", "def broken(:\n");
        write(root, ".venv/lib/site.py", "def hidden():\n    pass\n");
        write(root, "notes.txt", "not included");
        dir
    }

    #[test]
    fn collects_tree_then_files_in_path_order() {
        let dir = sample_project();
        let collected = collect_chunks("ocr", dir.path(), &IngestConfig::default()).unwrap();

        let kinds: Vec<ChunkKind> = collected.chunks.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChunkKind::FolderTree,
                ChunkKind::Section,
                ChunkKind::Section,
                ChunkKind::Function,
            ]
        );
        assert_eq!(collected.chunks[1].source, "README.md");
        assert_eq!(collected.chunks[3].source, "detect.py::detect");
        assert_eq!(collected.files_scanned, 3);
        assert_eq!(collected.files_skipped, 1);
        assert!(collected.chunks.iter().all(|c| c.project == "ocr"));
        assert!(!collected.chunks.iter().any(|c| c.text.contains("hidden")));
    }

    #[test]
    fn chunk_files_are_absolute() {
        let dir = sample_project();
        let collected = collect_chunks("ocr", dir.path(), &IngestConfig::default()).unwrap();
        let file = collected.chunks[3].file.as_ref().unwrap();
        assert!(file.is_absolute());
        assert!(file.ends_with("src/detect.py"));
    }

    #[test]
    fn latin1_document_is_still_indexed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("README.md"),
            b"# Overview\nCaf\xE9 pipeline with YOLO.",
        )
        .unwrap();
        let ingest = IngestConfig {
            folder_tree: false,
            ..IngestConfig::default()
        };

        let collected = collect_chunks("cafe", dir.path(), &ingest).unwrap();
        assert_eq!(collected.files_scanned, 1);
        assert_eq!(collected.files_skipped, 0);
        assert_eq!(collected.chunks.len(), 1);
        assert_eq!(collected.chunks[0].section_title.as_deref(), Some("Overview"));
        assert!(collected.chunks[0].text.ends_with("pipeline with YOLO."));
    }

    #[test]
    fn build_writes_consistent_artifacts() {
        let dir = sample_project();
        let out = tempfile::tempdir().unwrap();
        let embedder = HashingEmbedder::new(32);

        let report = build_index_for_project(
            "ocr",
            dir.path(),
            out.path(),
            &embedder,
            &IngestConfig::default(),
        )
        .unwrap();

        assert_eq!(report.chunks, 4);
        assert_eq!(report.dimensions, 32);
        let chunks = read_chunks(&report.chunks_path).unwrap();
        let index = FlatIndex::read(&report.index_path).unwrap();
        assert_eq!(chunks.len(), index.len());
        assert_eq!(index.model_id(), "hashing-v1");
        assert!(!out.path().join("chunks.json.tmp").exists());
        assert!(!out.path().join("vectors.db.tmp").exists());
    }

    #[test]
    fn missing_root_writes_empty_index() {
        let parent = tempfile::tempdir().unwrap();
        let out = parent.path().join("indexes/ghost");
        let embedder = HashingEmbedder::new(16);

        let report = build_index_for_project(
            "ghost",
            &parent.path().join("does-not-exist"),
            &out,
            &embedder,
            &IngestConfig::default(),
        )
        .unwrap();

        assert_eq!(report.chunks, 0);
        assert_eq!(fs::read_to_string(&report.chunks_path).unwrap(), "[]");
        let index = FlatIndex::read(&report.index_path).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimensions(), 16);
    }

    #[test]
    fn rebuild_with_same_input_is_identical() {
        let dir = sample_project();
        let out = tempfile::tempdir().unwrap();
        let embedder = HashingEmbedder::new(32);
        let ingest = IngestConfig::default();

        let first = build_index_for_project("ocr", dir.path(), out.path(), &embedder, &ingest)
            .unwrap();
        let json_first = fs::read_to_string(&first.chunks_path).unwrap();
        let vectors_first = FlatIndex::read(&first.index_path).unwrap();

        let second = build_index_for_project("ocr", dir.path(), out.path(), &embedder, &ingest)
            .unwrap();
        assert_eq!(fs::read_to_string(&second.chunks_path).unwrap(), json_first);
        let vectors_second = FlatIndex::read(&second.index_path).unwrap();
        let query = vec![0.1; 32];
        assert_eq!(
            vectors_first.search(&query, 4).unwrap(),
            vectors_second.search(&query, 4).unwrap()
        );
    }

    struct ShortEmbedder;

    impl Embedder for ShortEmbedder {
        fn model_id(&self) -> &str {
            "short"
        }
        fn dimensions(&self) -> usize {
            4
        }
        fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DossierError> {
            Ok(texts.iter().skip(1).map(|_| vec![0.0; 4]).collect())
        }
        fn embed_query(&self, _query: &str) -> Result<Vec<f32>, DossierError> {
            Ok(vec![0.0; 4])
        }
    }

    #[test]
    fn vector_count_mismatch_fails_build() {
        let dir = sample_project();
        let out = tempfile::tempdir().unwrap();
        let err = build_index_for_project(
            "ocr",
            dir.path(),
            out.path(),
            &ShortEmbedder,
            &IngestConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DossierError::Embedding(_)));
        assert!(!out.path().join(CHUNKS_FILE).exists());
    }

    #[test]
    fn build_all_follows_config_order() {
        let a = sample_project();
        let out = tempfile::tempdir().unwrap();
        let toml = format!(
            r#"
[[projects]]
id = "b"
root = "{root}/missing"
index_dir = "{out}/b"

[[projects]]
id = "a"
root = "{root}"
index_dir = "{out}/a"

[routing]
a = "receipt OCR"
b = "nothing"
"#,
            root = a.path().display(),
            out = out.path().display()
        );
        let config = DossierConfig::from_toml(&toml).unwrap();
        let reports = build_all(&config, &HashingEmbedder::new(8)).unwrap();
        let ids: Vec<&str> = reports.iter().map(|r| r.project.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(reports[0].chunks, 0);
        assert!(reports[1].chunks > 0);
    }

    #[test]
    fn corrupt_chunk_list_is_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHUNKS_FILE);
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_chunks(&path), Err(DossierError::Index(_))));
        assert!(matches!(
            read_chunks(&dir.path().join("missing.json")),
            Err(DossierError::FileNotFound(_))
        ));
    }
}
