//! Domain types flowing between the loader, the provisioner, the bulk loader
//! and the query runner.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub type DocumentId = String;

/// Largest dense-vector dimensionality the default engine profile accepts.
pub const MAX_DENSE_VECTOR_DIMS: usize = 1024;

pub const ID_FIELD: &str = "id";
pub const TEXT_FIELD: &str = "text";
pub const VECTOR_FIELD: &str = "vector";

/// A precomputed embedding keyed by the id of the text it was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: DocumentId,
    pub vector: Vec<f64>,
}

/// Read-only `id -> embedding` mapping.
///
/// Built once by the loader and only borrowed afterwards, so the bulk loader
/// and the concurrent query loop can share it without locking.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingStore {
    records: HashMap<DocumentId, EmbeddingRecord>,
}

impl EmbeddingStore {
    pub fn new(records: HashMap<DocumentId, EmbeddingRecord>) -> Self {
        Self { records }
    }

    pub fn vector(&self, id: &str) -> Option<&[f64]> {
        self.records.get(id).map(|r| r.vector.as_slice())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

impl FromIterator<EmbeddingRecord> for EmbeddingStore {
    fn from_iter<I: IntoIterator<Item = EmbeddingRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|r| (r.id.clone(), r)).collect())
    }
}

/// Raw content to be indexed, before it is paired with its vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: DocumentId,
    pub text: String,
}

impl SourceDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

/// The unit persisted to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: DocumentId,
    pub text: String,
    pub vector: Vec<f64>,
}

impl IndexedDocument {
    /// Pair a source document with its embedding.
    pub fn join(doc: &SourceDocument, store: &EmbeddingStore) -> Result<Self> {
        let vector = store
            .vector(&doc.id)
            .ok_or_else(|| Error::MissingEmbedding { id: doc.id.clone() })?;
        Ok(Self { id: doc.id.clone(), text: doc.text.clone(), vector: vector.to_vec() })
    }
}

/// Similarity metric declared on a dense-vector field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    #[default]
    Cosine,
    DotProduct,
    L2Norm,
}

impl Similarity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::DotProduct => "dot_product",
            Self::L2Norm => "l2_norm",
        }
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Similarity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot_product" => Ok(Self::DotProduct),
            "l2_norm" => Ok(Self::L2Norm),
            other => Err(Error::SchemaInvalid(format!(
                "unsupported similarity '{other}' (expected cosine, dot_product or l2_norm)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenseVectorField {
    pub dimensions: usize,
    pub indexed: bool,
    pub similarity: Similarity,
}

impl DenseVectorField {
    pub fn new(dimensions: usize, similarity: Similarity) -> Self {
        Self { dimensions, indexed: true, similarity }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMapping {
    Keyword,
    Text,
    DenseVector(DenseVectorField),
}

/// Field declarations of a KNN index: keyword `id`, full-text `text` and a
/// dense-vector `vector`.
///
/// Validated once when constructed; an `IndexSchema` value is always within
/// the engine limits it was checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    fields: Vec<(String, FieldMapping)>,
    vector: DenseVectorField,
}

impl IndexSchema {
    pub fn new(vector: DenseVectorField, max_dims: usize) -> Result<Self> {
        validate_dense_vector(&vector, max_dims)?;
        let fields = vec![
            (ID_FIELD.to_string(), FieldMapping::Keyword),
            (TEXT_FIELD.to_string(), FieldMapping::Text),
            (VECTOR_FIELD.to_string(), FieldMapping::DenseVector(vector)),
        ];
        Ok(Self { fields, vector })
    }

    pub fn fields(&self) -> &[(String, FieldMapping)] {
        &self.fields
    }

    pub fn vector_field(&self) -> &str {
        VECTOR_FIELD
    }

    pub fn dense_vector(&self) -> &DenseVectorField {
        &self.vector
    }

    pub fn dimensions(&self) -> usize {
        self.vector.dimensions
    }

    pub fn similarity(&self) -> Similarity {
        self.vector.similarity
    }

    /// Re-check the schema against a (possibly stricter) engine limit.
    pub fn validate(&self, max_dims: usize) -> Result<()> {
        validate_dense_vector(&self.vector, max_dims)
    }
}

fn validate_dense_vector(field: &DenseVectorField, max_dims: usize) -> Result<()> {
    if field.dimensions == 0 {
        return Err(Error::SchemaInvalid("dimensions must be a positive integer".to_string()));
    }
    if field.dimensions > max_dims {
        return Err(Error::SchemaInvalid(format!(
            "dimensions {} exceed the engine maximum of {}",
            field.dimensions, max_dims
        )));
    }
    Ok(())
}

/// A single approximate nearest-neighbour request.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub target_field: String,
    pub query_vector: Vec<f64>,
    pub k: usize,
    pub num_candidates: usize,
}

impl QuerySpec {
    pub fn new(
        target_field: impl Into<String>,
        query_vector: Vec<f64>,
        k: usize,
        num_candidates: usize,
    ) -> Result<Self> {
        if k == 0 {
            return Err(Error::InvalidQuery("k must be at least 1".to_string()));
        }
        if num_candidates < k {
            return Err(Error::InvalidQuery(format!(
                "num_candidates ({num_candidates}) must be >= k ({k})"
            )));
        }
        if query_vector.is_empty() {
            return Err(Error::InvalidQuery("query vector is empty".to_string()));
        }
        Ok(Self { target_field: target_field.into(), query_vector, k, num_candidates })
    }

    /// Reject vectors whose length differs from the index dimensionality.
    pub fn check_dimensions(&self, dimensions: usize) -> Result<()> {
        if self.query_vector.len() != dimensions {
            return Err(Error::InvalidQuery(format!(
                "query vector has {} dimensions, field '{}' expects {}",
                self.query_vector.len(),
                self.target_field,
                dimensions
            )));
        }
        Ok(())
    }
}

/// One ranked result. Higher `score` is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub document_id: DocumentId,
    pub score: f64,
    pub source: IndexedDocument,
}

/// A query embedding together with the text it stands for.
///
/// `vector` is `None` when the query id had no embedding; the runner reports
/// such queries as failures without stopping the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledQuery {
    pub id: String,
    pub label: String,
    pub vector: Option<Vec<f64>>,
}

/// Non-error outcomes of deleting an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Absent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    Create(IndexedDocument),
}

impl BulkOperation {
    pub fn id(&self) -> &str {
        match self {
            Self::Create(doc) => &doc.id,
        }
    }

    pub fn document(&self) -> &IndexedDocument {
        match self {
            Self::Create(doc) => doc,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemError {
    pub kind: String,
    pub reason: String,
}

/// Per-item outcome of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemResult {
    pub id: DocumentId,
    pub status: u16,
    pub error: Option<BulkItemError>,
}

impl BulkItemResult {
    pub fn ok(id: impl Into<String>, status: u16) -> Self {
        Self { id: id.into(), status, error: None }
    }

    pub fn failed(id: impl Into<String>, status: u16, kind: &str, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status,
            error: Some(BulkItemError { kind: kind.to_string(), reason: reason.into() }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}
