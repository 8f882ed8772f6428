//! Query-time retrieval over built project indexes.
//!
//! A [`Retriever`](retriever::Retriever) answers queries against one
//! project's index, re-ranking nearest neighbours by chunk kind. The
//! [`ProjectRouter`](router::ProjectRouter) picks the projects whose routing
//! descriptors best match a query and merges their results, and
//! [`build_context`](context::build_context) renders the final list as
//! citation-numbered text.

pub mod context;
pub mod retriever;
pub mod router;
