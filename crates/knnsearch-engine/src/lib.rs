//! knnsearch-engine
//!
//! Implementations of [`SearchClient`](knnsearch_core::SearchClient): an HTTP
//! client for Elasticsearch-compatible clusters and an in-process engine used
//! for local runs and tests.

pub mod elastic;
pub mod memory;

pub use elastic::ElasticClient;
pub use memory::MemoryEngine;
