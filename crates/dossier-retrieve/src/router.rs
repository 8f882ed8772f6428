//! Cross-project routing and result aggregation.
//!
//! Each project carries a short routing descriptor. Descriptors are embedded
//! once when the router is built; a query is scored against all of them by
//! cosine similarity and only the best-matching projects are searched.

use std::cmp::Ordering;
use std::sync::Arc;

use dossier_core::{DossierConfig, DossierError, RetrievalConfig, RetrievedChunk};
use dossier_index::embedding::{cosine_similarity, Embedder};
use serde::{Deserialize, Serialize};

use crate::retriever::Retriever;

/// A project offered to the router.
#[derive(Debug)]
pub struct ProjectRoute {
    /// Project id.
    pub id: String,
    /// Free-text description of the project's domain.
    pub descriptor: String,
    /// Retriever over the project's index.
    pub retriever: Retriever,
}

/// Cosine score of one project's descriptor against a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteScore {
    /// Project id.
    pub project: String,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f64,
}

/// A configured project the router could not load.
#[derive(Debug, Clone)]
pub struct SkippedProject {
    /// Project id.
    pub id: String,
    /// Why loading failed.
    pub reason: String,
}

/// Result of [`ProjectRouter::from_config`].
#[derive(Debug)]
pub struct RouterLoad {
    /// Router over every project that loaded.
    pub router: ProjectRouter,
    /// Projects left out, in config order.
    pub skipped: Vec<SkippedProject>,
}

struct CachedRoute {
    route: ProjectRoute,
    embedding: Vec<f32>,
}

/// Selects the projects most relevant to a query and merges their results.
pub struct ProjectRouter {
    embedder: Arc<dyn Embedder>,
    routes: Vec<CachedRoute>,
}

impl std::fmt::Debug for ProjectRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectRouter")
            .field("projects", &self.project_ids())
            .finish_non_exhaustive()
    }
}

impl ProjectRouter {
    /// Build a router, embedding every descriptor once.
    ///
    /// Route order is the tie-break order for equal scores.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Embedding`] if descriptors cannot be embedded.
    pub fn new(embedder: Arc<dyn Embedder>, routes: Vec<ProjectRoute>) -> Result<Self, DossierError> {
        let descriptors: Vec<String> = routes.iter().map(|r| r.descriptor.clone()).collect();
        let embeddings = if descriptors.is_empty() {
            Vec::new()
        } else {
            embedder.embed_documents(&descriptors)?
        };
        if embeddings.len() != routes.len() {
            return Err(DossierError::Embedding(format!(
                "embedder returned {} vectors for {} routing descriptors",
                embeddings.len(),
                routes.len()
            )));
        }

        let routes = routes
            .into_iter()
            .zip(embeddings)
            .map(|(route, embedding)| CachedRoute { route, embedding })
            .collect();
        Ok(Self { embedder, routes })
    }

    /// Open every configured project's index, skipping any that fail.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Embedding`] if descriptors cannot be embedded.
    /// Individual index failures are reported in [`RouterLoad::skipped`].
    pub fn from_config(
        config: &DossierConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<RouterLoad, DossierError> {
        let mut routes = Vec::new();
        let mut skipped = Vec::new();

        for project in &config.projects {
            let descriptor = config.descriptor(&project.id).unwrap_or_default();
            match Retriever::open(project.id.as_str(), &project.index_dir, Arc::clone(&embedder)) {
                Ok(retriever) => routes.push(ProjectRoute {
                    id: project.id.clone(),
                    descriptor: descriptor.to_string(),
                    retriever,
                }),
                Err(e) => {
                    tracing::warn!("skipping project '{}': {e}", project.id);
                    skipped.push(SkippedProject {
                        id: project.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let router = Self::new(embedder, routes)?;
        Ok(RouterLoad { router, skipped })
    }

    /// Ids of the routable projects, in tie-break order.
    pub fn project_ids(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.route.id.as_str()).collect()
    }

    /// Retriever for one project.
    pub fn retriever(&self, id: &str) -> Option<&Retriever> {
        self.routes
            .iter()
            .find(|r| r.route.id == id)
            .map(|r| &r.route.retriever)
    }

    /// The `n` projects whose descriptors best match `query`, best first.
    ///
    /// Equal scores keep route order; a NaN score ranks last.
    ///
    /// # Errors
    ///
    /// Returns [`DossierError::Embedding`] if the query cannot be embedded.
    pub fn route(&self, query: &str, n: usize) -> Result<Vec<RouteScore>, DossierError> {
        if n == 0 || self.routes.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed_query(query)?;
        Ok(self.route_vector(&query_vector, n))
    }

    fn route_vector(&self, query_vector: &[f32], n: usize) -> Vec<RouteScore> {
        let mut scores: Vec<RouteScore> = self
            .routes
            .iter()
            .map(|r| RouteScore {
                project: r.route.id.clone(),
                score: cosine_similarity(query_vector, &r.embedding),
            })
            .collect();
        scores.sort_by(|a, b| descending(a.score, b.score));
        for s in &scores {
            tracing::debug!("route score {:.4} for '{}'", s.score, s.project);
        }
        scores.truncate(n);
        scores
    }

    /// Routed multi-project retrieval.
    ///
    /// Selects `settings.select_count` projects, takes
    /// `settings.per_project_top_k` chunks from each in selection order and
    /// caps the merged list at `settings.max_chunks`. The query is embedded
    /// once and shared by routing and every selected retriever.
    ///
    /// # Errors
    ///
    /// Propagates embedding and index errors from routing or any retriever.
    pub fn retrieve(
        &self,
        query: &str,
        settings: &RetrievalConfig,
    ) -> Result<Vec<RetrievedChunk>, DossierError> {
        if settings.select_count == 0 || self.routes.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed_query(query)?;
        let selected = self.route_vector(&query_vector, settings.select_count);

        let mut merged = Vec::new();
        for choice in &selected {
            let Some(retriever) = self.retriever(&choice.project) else {
                continue;
            };
            let chunks = retriever.retrieve_vector(&query_vector, settings.per_project_top_k)?;
            merged.extend(
                chunks
                    .into_iter()
                    .map(|chunk| RetrievedChunk::new(choice.project.as_str(), chunk)),
            );
        }
        merged.truncate(settings.max_chunks);
        Ok(merged)
    }

    /// Single-project retrieval with `settings.top_k`, tagged and capped the
    /// same way as routed retrieval.
    ///
    /// # Errors
    ///
    /// Propagates embedding and index errors from the retriever.
    pub fn retrieve_single(
        retriever: &Retriever,
        query: &str,
        settings: &RetrievalConfig,
    ) -> Result<Vec<RetrievedChunk>, DossierError> {
        let mut results: Vec<RetrievedChunk> = retriever
            .retrieve(query, settings.top_k)?
            .into_iter()
            .map(|chunk| RetrievedChunk::new(retriever.project(), chunk))
            .collect();
        results.truncate(settings.max_chunks);
        Ok(results)
    }
}

fn descending(a: f64, b: f64) -> Ordering {
    let key = |s: f64| if s.is_nan() { f64::NEG_INFINITY } else { s };
    key(b).total_cmp(&key(a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descending_puts_nan_last() {
        let mut scores = vec![0.2, f64::NAN, 0.9, -0.5];
        scores.sort_by(|a, b| descending(*a, *b));
        assert_eq!(&scores[..3], &[0.9, 0.2, -0.5]);
        assert!(scores[3].is_nan());
    }

    #[test]
    fn descending_is_stable_for_ties() {
        let mut pairs = vec![("a", 0.5), ("b", 0.7), ("c", 0.5)];
        pairs.sort_by(|x, y| descending(x.1, y.1));
        let order: Vec<&str> = pairs.iter().map(|p| p.0).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }
}
