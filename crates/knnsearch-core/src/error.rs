//! Error taxonomy shared by every stage of the workflow.
//!
//! Load, provisioning and bulk errors are fatal to the workflow. `QueryFailure`
//! is the only variant the query loop records and moves past.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Malformed record in {} at line {line}: {reason}", path.display())]
    MalformedRow { path: PathBuf, line: usize, reason: String },

    #[error("Malformed embedding for '{id}' at line {line}: {reason}")]
    MalformedEmbedding { line: usize, id: String, reason: String },

    #[error("Invalid index schema: {0}")]
    SchemaInvalid(String),

    #[error("Index already exists: {0}")]
    AlreadyExists(String),

    #[error("No embedding for document '{id}'")]
    MissingEmbedding { id: String },

    #[error("Bulk item '{id}' failed: {reason}")]
    BulkItemFailure { id: String, reason: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Query '{query_id}' failed: {reason}")]
    QueryFailure { query_id: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Whether the workflow must stop when this error surfaces.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::QueryFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
