//! Exhaustive L2 vector index persisted as a SQLite file.
//!
//! Vectors are stored as little-endian `f32` BLOBs keyed by their position,
//! with a `metadata` table recording dimensions, model id, vector count and
//! build time. Search is brute force over the in-memory copy.

use std::path::Path;

use dossier_core::DossierError;
use rusqlite::{params, Connection, OpenFlags};

/// Position reported for missing results.
pub const NO_MATCH: i64 = -1;

/// One search result: squared L2 distance and row position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Squared Euclidean distance to the query.
    pub distance: f32,
    /// Row position, or [`NO_MATCH`].
    pub position: i64,
}

impl Neighbor {
    /// Whether this entry refers to a stored vector.
    pub fn is_match(&self) -> bool {
        self.position >= 0
    }
}

/// Flat L2 index over fixed-dimension vectors.
///
/// # Examples
///
/// ```
/// use dossier_index::flat::FlatIndex;
///
/// let mut index = FlatIndex::new(2, "test");
/// index.add(&[vec![0.0, 0.0], vec![3.0, 4.0]]).unwrap();
///
/// let hits = index.search(&[3.0, 3.0], 3).unwrap();
/// assert_eq!(hits.len(), 3);
/// assert_eq!(hits[0].position, 1);
/// assert_eq!(hits[2].position, -1);
/// ```
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    model_id: String,
    data: Vec<f32>,
    built_at: Option<String>,
}

impl FlatIndex {
    /// Create an empty index declaring `dimensions`.
    pub fn new(dimensions: usize, model_id: impl Into<String>) -> Self {
        Self {
            dimensions,
            model_id: model_id.into(),
            data: Vec::new(),
            built_at: None,
        }
    }

    /// Declared vector length.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embedder model id the vectors were produced with.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// RFC 3339 build time, for indexes read from disk.
    pub fn built_at(&self) -> Option<&str> {
        self.built_at.as_deref()
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dimensions == 0 {
            0
        } else {
            self.data.len() / self.dimensions
        }
    }

    /// Whether no vectors are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append vectors; each takes the next row position.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Index`] if any vector has the wrong length.
    /// Nothing is added in that case.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), DossierError> {
        if let Some((i, v)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != self.dimensions)
        {
            return Err(DossierError::Index(format!(
                "vector {i} has {} dimensions, index expects {}",
                v.len(),
                self.dimensions
            )));
        }
        self.data.reserve(vectors.len() * self.dimensions);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    /// The `k` nearest stored vectors, closest first.
    ///
    /// Always returns exactly `k` entries; slots beyond the stored count
    /// have position [`NO_MATCH`] and infinite distance. Equal distances
    /// keep position order.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Index`] if `query` has the wrong length.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, DossierError> {
        if query.len() != self.dimensions {
            return Err(DossierError::Index(format!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimensions.max(1))
            .enumerate()
            .map(|(position, vector)| Neighbor {
                distance: squared_l2(query, vector),
                position: position as i64,
            })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        scored.resize(
            k,
            Neighbor {
                distance: f32::INFINITY,
                position: NO_MATCH,
            },
        );
        Ok(scored)
    }

    /// Write the index to a new SQLite file at `path`.
    ///
    /// Any existing file at `path` is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Database`] on any SQLite failure.
    pub fn write(&self, path: &Path) -> Result<(), DossierError> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let mut conn = Connection::open(path)
            .map_err(|e| DossierError::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch(
            "
            CREATE TABLE metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE vectors (
                position INTEGER PRIMARY KEY,
                embedding BLOB NOT NULL
            );
            ",
        )
        .map_err(|e| DossierError::Database(format!("failed to create schema: {e}")))?;

        let tx = conn
            .transaction()
            .map_err(|e| DossierError::Database(format!("failed to begin transaction: {e}")))?;
        {
            let mut meta = tx
                .prepare("INSERT INTO metadata (key, value) VALUES (?1, ?2)")
                .map_err(|e| DossierError::Database(format!("failed to prepare insert: {e}")))?;
            let built_at = chrono::Utc::now().to_rfc3339();
            for (key, value) in [
                ("dimensions", self.dimensions.to_string()),
                ("model_id", self.model_id.clone()),
                ("count", self.len().to_string()),
                ("built_at", built_at),
            ] {
                meta.execute(params![key, value]).map_err(|e| {
                    DossierError::Database(format!("failed to set metadata '{key}': {e}"))
                })?;
            }

            let mut insert = tx
                .prepare("INSERT INTO vectors (position, embedding) VALUES (?1, ?2)")
                .map_err(|e| DossierError::Database(format!("failed to prepare insert: {e}")))?;
            for (position, vector) in self.data.chunks_exact(self.dimensions.max(1)).enumerate() {
                insert
                    .execute(params![position as i64, floats_to_bytes(vector)])
                    .map_err(|e| DossierError::Database(format!("failed to insert vector: {e}")))?;
            }
        }
        tx.commit()
            .map_err(|e| DossierError::Database(format!("failed to commit: {e}")))?;
        Ok(())
    }

    /// Read an index written by [`FlatIndex::write`].
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::FileNotFound`] if `path` does not exist, or
    /// [`DossierError::Index`] if the file is not a valid index.
    pub fn read(path: &Path) -> Result<Self, DossierError> {
        if !path.exists() {
            return Err(DossierError::FileNotFound(path.to_path_buf()));
        }
        let corrupt = |what: String| {
            DossierError::Index(format!("corrupt vector index {}: {what}", path.display()))
        };

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| corrupt(e.to_string()))?;

        let metadata = |key: &str| -> Result<String, DossierError> {
            conn.query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .map_err(|e| corrupt(format!("metadata '{key}': {e}")))
        };

        let dimensions: usize = metadata("dimensions")?
            .parse()
            .map_err(|_| corrupt("dimensions is not a number".into()))?;
        let count: usize = metadata("count")?
            .parse()
            .map_err(|_| corrupt("count is not a number".into()))?;
        let model_id = metadata("model_id")?;
        let built_at = metadata("built_at").ok();

        let mut stmt = conn
            .prepare("SELECT embedding FROM vectors ORDER BY position")
            .map_err(|e| corrupt(e.to_string()))?;
        let blobs = stmt
            .query_map([], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| corrupt(e.to_string()))?;

        let mut data = Vec::with_capacity(count * dimensions);
        let mut rows = 0usize;
        for blob in blobs {
            let blob = blob.map_err(|e| corrupt(e.to_string()))?;
            if blob.len() != dimensions * 4 {
                return Err(corrupt(format!(
                    "vector {rows} has {} bytes, expected {}",
                    blob.len(),
                    dimensions * 4
                )));
            }
            data.extend(bytes_to_floats(&blob));
            rows += 1;
        }

        if rows != count {
            return Err(corrupt(format!("metadata declares {count} vectors, found {rows}")));
        }

        Ok(Self {
            dimensions,
            model_id,
            data,
            built_at,
        })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(floats.len() * 4);
    for f in floats {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlatIndex {
        let mut index = FlatIndex::new(3, "hashing-v1");
        index
            .add(&[
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ])
            .unwrap();
        index
    }

    #[test]
    fn search_orders_by_distance() {
        let index = sample();
        let hits = index.search(&[0.1, 0.9, 0.0], 2).unwrap();
        assert_eq!(hits.iter().map(|h| h.position).collect::<Vec<_>>(), vec![1, 0]);
        assert!(hits[0].distance < hits[1].distance);
    }

    #[test]
    fn search_pads_with_sentinel() {
        let index = sample();
        let hits = index.search(&[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 5);
        assert!(hits[..3].iter().all(Neighbor::is_match));
        assert!(hits[3..].iter().all(|h| h.position == NO_MATCH && h.distance.is_infinite()));
    }

    #[test]
    fn empty_index_returns_only_sentinels() {
        let index = FlatIndex::new(4, "m");
        assert!(index.is_empty());
        let hits = index.search(&[0.0; 4], 2).unwrap();
        assert!(hits.iter().all(|h| !h.is_match()));
    }

    #[test]
    fn equal_distances_keep_position_order() {
        let mut index = FlatIndex::new(1, "m");
        index.add(&[vec![1.0], vec![-1.0], vec![1.0]]).unwrap();
        let hits = index.search(&[0.0], 3).unwrap();
        assert_eq!(hits.iter().map(|h| h.position).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn wrong_dimensions_are_rejected() {
        let mut index = sample();
        let err = index.add(&[vec![1.0, 2.0]]).unwrap_err();
        assert!(matches!(err, DossierError::Index(_)));
        assert_eq!(index.len(), 3);

        let err = index.search(&[1.0; 4], 1).unwrap_err();
        assert!(err.to_string().contains("expects 3"));
    }

    #[test]
    fn write_then_read_preserves_vectors_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");
        let index = sample();
        index.write(&path).unwrap();

        let loaded = FlatIndex::read(&path).unwrap();
        assert_eq!(loaded.dimensions(), 3);
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.model_id(), "hashing-v1");
        assert!(loaded.built_at().is_some());
        assert_eq!(
            loaded.search(&[0.0, 0.0, 1.0], 1).unwrap()[0].position,
            index.search(&[0.0, 0.0, 1.0], 1).unwrap()[0].position
        );
    }

    #[test]
    fn empty_index_persists_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");
        FlatIndex::new(384, "hashing-v1").write(&path).unwrap();

        let loaded = FlatIndex::read(&path).unwrap();
        assert_eq!(loaded.dimensions(), 384);
        assert!(loaded.is_empty());
    }

    #[test]
    fn rewrite_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");
        sample().write(&path).unwrap();
        FlatIndex::new(3, "hashing-v1").write(&path).unwrap();
        assert!(FlatIndex::read(&path).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FlatIndex::read(&dir.path().join("nope.db")).unwrap_err();
        assert!(matches!(err, DossierError::FileNotFound(_)));
    }

    #[test]
    fn garbage_file_is_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");
        std::fs::write(&path, b"definitely not sqlite, just some bytes on disk").unwrap();
        let err = FlatIndex::read(&path).unwrap_err();
        assert!(matches!(err, DossierError::Index(_)));
    }

    #[test]
    fn count_mismatch_is_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");
        sample().write(&path).unwrap();
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("DELETE FROM vectors WHERE position = 2", []).unwrap();
        }
        let err = FlatIndex::read(&path).unwrap_err();
        assert!(err.to_string().contains("declares 3 vectors, found 2"));
    }

    #[test]
    fn floats_bytes_roundtrip() {
        let original = vec![1.0f32, -2.5, 0.0, 3.25];
        assert_eq!(bytes_to_floats(&floats_to_bytes(&original)), original);
    }
}
