//! Embedding, flat vector storage and per-project index builds.

pub mod builder;
pub mod embedding;
pub mod flat;
