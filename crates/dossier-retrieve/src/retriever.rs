//! Single-project nearest-neighbour search with kind-priority re-ranking.

use std::cmp::Reverse;
use std::path::Path;
use std::sync::Arc;

use dossier_core::{Chunk, ChunkKind, DossierError};
use dossier_index::builder::{read_chunks, CHUNKS_FILE, INDEX_FILE};
use dossier_index::embedding::Embedder;
use dossier_index::flat::FlatIndex;

/// Rank weight of a chunk kind; higher sorts first among candidates.
///
/// # Examples
///
/// ```
/// use dossier_core::ChunkKind;
/// use dossier_retrieve::retriever::priority;
///
/// assert!(priority(ChunkKind::FolderTree) > priority(ChunkKind::Section));
/// assert!(priority(ChunkKind::Section) > priority(ChunkKind::Function));
/// assert_eq!(priority(ChunkKind::Other), 0);
/// ```
pub fn priority(kind: ChunkKind) -> u8 {
    match kind {
        ChunkKind::FolderTree => 3,
        ChunkKind::Section => 2,
        ChunkKind::Function => 1,
        ChunkKind::Other => 0,
    }
}

/// Query-time view of one project's index.
///
/// Holds the vectors and chunk list in memory; read-only after opening.
pub struct Retriever {
    project: String,
    index: FlatIndex,
    chunks: Vec<Chunk>,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("project", &self.project)
            .field("chunks", &self.chunks.len())
            .field("dimensions", &self.index.dimensions())
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Load `chunks.json` and `vectors.db` from `index_dir`.
    ///
    /// A model id differing from the embedder's is logged, not rejected.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::FileNotFound`] if either artifact is missing,
    /// or [`DossierError::Index`] if one is corrupt or their lengths differ.
    pub fn open(
        project: impl Into<String>,
        index_dir: &Path,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, DossierError> {
        let project = project.into();
        let chunks = read_chunks(&index_dir.join(CHUNKS_FILE))?;
        let index = FlatIndex::read(&index_dir.join(INDEX_FILE))?;

        if index.model_id() != embedder.model_id() {
            tracing::warn!(
                "index for '{project}' was built with '{}' but queries use '{}'; rebuild to get meaningful results",
                index.model_id(),
                embedder.model_id()
            );
        }

        Self::from_parts(project, index, chunks, embedder)
    }

    /// Assemble a retriever from an in-memory index and chunk list.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Index`] if the vector count differs from the
    /// chunk count.
    pub fn from_parts(
        project: impl Into<String>,
        index: FlatIndex,
        chunks: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, DossierError> {
        let project = project.into();
        if index.len() != chunks.len() {
            return Err(DossierError::Index(format!(
                "index for '{project}' holds {} vectors but {} chunks",
                index.len(),
                chunks.len()
            )));
        }
        Ok(Self {
            project,
            index,
            chunks,
            embedder,
        })
    }

    /// Project this retriever serves.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Up to `top_k` chunks relevant to `query`.
    ///
    /// Embeds `query` and delegates to [`retrieve_vector`](Self::retrieve_vector).
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Embedding`] if the query cannot be embedded,
    /// or [`DossierError::Index`] if its dimension differs from the index's.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Chunk>, DossierError> {
        if top_k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed_query(query)?;
        self.retrieve_vector(&query_vector, top_k)
    }

    /// Up to `top_k` chunks nearest an already-embedded query.
    ///
    /// Fetches `2 * top_k` nearest neighbours (never more than the index
    /// holds), then stable-sorts them by [`priority`] so that structural and
    /// documentation chunks outrank code at similar distance, and truncates.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Index`] if the vector's dimension differs
    /// from the index's.
    pub fn retrieve_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<Chunk>, DossierError> {
        if top_k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        // slots past len() would only be sentinels
        let fetch = top_k.saturating_mul(2).min(self.index.len());
        let neighbors = self.index.search(query_vector, fetch)?;

        let mut candidates: Vec<&Chunk> = neighbors
            .iter()
            .filter(|n| n.is_match())
            .filter_map(|n| self.chunks.get(n.position as usize))
            .collect();
        candidates.sort_by_key(|c| Reverse(priority(c.kind)));
        candidates.truncate(top_k);

        tracing::debug!(
            "retrieved {} chunks from '{}'",
            candidates.len(),
            self.project
        );

        Ok(candidates.into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Embeds text as a one-hot vector on the first digit it contains.
    struct DigitEmbedder;

    impl DigitEmbedder {
        fn vector(text: &str) -> Vec<f32> {
            let mut v = vec![0.0; 10];
            if let Some(d) = text.chars().find_map(|c| c.to_digit(10)) {
                v[d as usize] = 1.0;
            }
            v
        }
    }

    impl Embedder for DigitEmbedder {
        fn model_id(&self) -> &str {
            "digit"
        }
        fn dimensions(&self) -> usize {
            10
        }
        fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DossierError> {
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }
        fn embed_query(&self, query: &str) -> Result<Vec<f32>, DossierError> {
            Ok(Self::vector(query))
        }
    }

    fn chunk(kind: ChunkKind, text: &str) -> Chunk {
        Chunk::new("demo", "src", kind, text).unwrap()
    }

    fn retriever(chunks: Vec<Chunk>) -> Retriever {
        let embedder: Arc<dyn Embedder> = Arc::new(DigitEmbedder);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut index = FlatIndex::new(10, "digit");
        index.add(&embedder.embed_documents(&texts).unwrap()).unwrap();
        Retriever::from_parts("demo", index, chunks, embedder).unwrap()
    }

    #[test]
    fn section_outranks_nearer_function() {
        let r = retriever(vec![
            chunk(ChunkKind::Function, "fn 1"),
            chunk(ChunkKind::Section, "section 2"),
        ]);
        let results = r.retrieve("1", 2).unwrap();
        assert_eq!(results[0].kind, ChunkKind::Section);
        assert_eq!(results[1].kind, ChunkKind::Function);
    }

    #[test]
    fn equal_priority_keeps_neighbor_order() {
        let r = retriever(vec![
            chunk(ChunkKind::Section, "far 5"),
            chunk(ChunkKind::Section, "near 1"),
        ]);
        let results = r.retrieve("1", 2).unwrap();
        assert_eq!(results[0].text, "near 1");
        assert_eq!(results[1].text, "far 5");
    }

    #[test]
    fn never_exceeds_top_k_or_returns_sentinels() {
        let r = retriever(vec![
            chunk(ChunkKind::Function, "a 1"),
            chunk(ChunkKind::Function, "b 2"),
            chunk(ChunkKind::Other, "c 3"),
        ]);
        assert_eq!(r.retrieve("1", 2).unwrap().len(), 2);
        // fewer vectors than requested
        assert_eq!(r.retrieve("1", 5).unwrap().len(), 3);
    }

    #[test]
    fn folder_tree_ranks_first() {
        let r = retriever(vec![
            chunk(ChunkKind::Section, "readme 1"),
            chunk(ChunkKind::Function, "fn 1"),
            chunk(ChunkKind::FolderTree, "tree 9"),
        ]);
        let results = r.retrieve("1", 3).unwrap();
        let kinds: Vec<ChunkKind> = results.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![ChunkKind::FolderTree, ChunkKind::Section, ChunkKind::Function]
        );
    }

    #[test]
    fn zero_top_k_and_empty_index_return_nothing() {
        let r = retriever(vec![chunk(ChunkKind::Section, "x 1")]);
        assert!(r.retrieve("1", 0).unwrap().is_empty());

        let empty = retriever(Vec::new());
        assert!(empty.is_empty());
        assert!(empty.retrieve("anything", 5).unwrap().is_empty());
    }

    #[test]
    fn mismatched_parts_are_rejected() {
        let index = FlatIndex::new(10, "digit");
        let err = Retriever::from_parts(
            "demo",
            index,
            vec![chunk(ChunkKind::Section, "orphan")],
            Arc::new(DigitEmbedder),
        )
        .unwrap_err();
        assert!(matches!(err, DossierError::Index(_)));
    }

    #[test]
    fn query_dimension_mismatch_is_index_error() {
        let mut index = FlatIndex::new(3, "other");
        index.add(&[vec![0.0, 0.0, 1.0]]).unwrap();
        let r = Retriever::from_parts(
            "demo",
            index,
            vec![chunk(ChunkKind::Section, "x")],
            Arc::new(DigitEmbedder),
        )
        .unwrap();
        assert!(matches!(r.retrieve("1", 1), Err(DossierError::Index(_))));
    }

    #[test]
    fn huge_top_k_is_bounded_by_index_size() {
        let r = retriever(vec![
            chunk(ChunkKind::Function, "a 1"),
            chunk(ChunkKind::Section, "b 2"),
        ]);
        assert_eq!(r.retrieve("1", usize::MAX).unwrap().len(), 2);
        assert_eq!(r.retrieve("1", usize::MAX / 2 + 1).unwrap().len(), 2);
        assert_eq!(r.retrieve("1", 1 << 60).unwrap().len(), 2);
    }

    #[test]
    fn retrieve_vector_matches_retrieve() {
        let r = retriever(vec![
            chunk(ChunkKind::Function, "fn 3"),
            chunk(ChunkKind::Section, "notes 3"),
            chunk(ChunkKind::Section, "other 7"),
        ]);
        let by_text = r.retrieve("3", 2).unwrap();
        let by_vector = r.retrieve_vector(&DigitEmbedder::vector("3"), 2).unwrap();
        assert_eq!(by_vector.len(), 2);
        assert_eq!(by_text, by_vector);
    }
}
