//! knnsearch-embed
//!
//! Loaders for precomputed embeddings and the records they belong to. Nothing
//! here computes embeddings; vectors are read as produced by an external model.

pub mod documents;
pub mod store;

pub use documents::{load_documents, load_queries};
pub use store::{load_embeddings, parse_embeddings};
