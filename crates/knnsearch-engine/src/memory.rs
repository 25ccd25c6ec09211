//! In-process engine honouring the same contract as the HTTP client.
//!
//! Search is exact (every visible document is scored), then cut to
//! `num_candidates` and finally to `k`, so results match what an approximate
//! engine returns when its candidate pool is large enough. Scores follow the
//! Elasticsearch conventions for each similarity so they are comparable with a
//! real cluster:
//!
//! | similarity    | score             |
//! |---------------|-------------------|
//! | `cosine`      | `(1 + cos) / 2`   |
//! | `dot_product` | `(1 + dot) / 2`   |
//! | `l2_norm`     | `1 / (1 + d²)`    |

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use knnsearch_core::error::{Error, Result};
use knnsearch_core::traits::SearchClient;
use knnsearch_core::types::{
    BulkItemResult, BulkOperation, DeleteOutcome, IndexSchema, IndexedDocument, QuerySpec,
    SearchHit, Similarity, MAX_DENSE_VECTOR_DIMS,
};

const UNIT_LENGTH_TOLERANCE: f64 = 1e-4;

pub struct MemoryEngine {
    indices: RwLock<HashMap<String, MemoryIndex>>,
    max_dims: usize,
    deferred_refresh: bool,
    bulk_requests: AtomicUsize,
}

struct MemoryIndex {
    schema: IndexSchema,
    visible: Vec<IndexedDocument>,
    pending: Vec<IndexedDocument>,
    ids: HashSet<String>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Documents become searchable as soon as the bulk request returns.
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            max_dims: MAX_DENSE_VECTOR_DIMS,
            deferred_refresh: false,
            bulk_requests: AtomicUsize::new(0),
        }
    }

    /// Documents stay invisible to `search` until `refresh` is called.
    pub fn with_deferred_refresh() -> Self {
        Self { deferred_refresh: true, ..Self::new() }
    }

    #[must_use]
    pub fn max_dims(mut self, max_dims: usize) -> Self {
        self.max_dims = max_dims;
        self
    }

    /// Number of bulk requests received so far, including rejected ones.
    pub fn bulk_request_count(&self) -> usize {
        self.bulk_requests.load(Ordering::SeqCst)
    }

    /// Documents stored in `name`, visible or not.
    pub async fn document_count(&self, name: &str) -> Option<usize> {
        let indices = self.indices.read().await;
        indices.get(name).map(|idx| idx.visible.len() + idx.pending.len())
    }

    pub async fn index_exists(&self, name: &str) -> bool {
        self.indices.read().await.contains_key(name)
    }
}

#[async_trait]
impl SearchClient for MemoryEngine {
    async fn delete_index(&self, name: &str) -> Result<DeleteOutcome> {
        let mut indices = self.indices.write().await;
        Ok(match indices.remove(name) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::Absent,
        })
    }

    async fn create_index(&self, name: &str, schema: &IndexSchema) -> Result<()> {
        schema.validate(self.max_dims)?;
        let mut indices = self.indices.write().await;
        if indices.contains_key(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        indices.insert(
            name.to_string(),
            MemoryIndex { schema: schema.clone(), visible: Vec::new(), pending: Vec::new(), ids: HashSet::new() },
        );
        Ok(())
    }

    async fn bulk(&self, target: &str, operations: &[BulkOperation]) -> Result<Vec<BulkItemResult>> {
        self.bulk_requests.fetch_add(1, Ordering::SeqCst);
        let mut indices = self.indices.write().await;
        let index = indices.get_mut(target).ok_or_else(|| Error::NotFound(format!("index '{target}'")))?;
        let mut results = Vec::with_capacity(operations.len());
        for op in operations {
            let doc = op.document();
            let result = match index.admit(doc) {
                Ok(()) => {
                    index.ids.insert(doc.id.clone());
                    if self.deferred_refresh {
                        index.pending.push(doc.clone());
                    } else {
                        index.visible.push(doc.clone());
                    }
                    BulkItemResult::ok(doc.id.clone(), 201)
                }
                Err(failure) => failure,
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn search(&self, target: &str, query: &QuerySpec) -> Result<Vec<SearchHit>> {
        let indices = self.indices.read().await;
        let index = indices.get(target).ok_or_else(|| Error::NotFound(format!("index '{target}'")))?;
        if query.target_field != index.schema.vector_field() {
            return Err(Error::InvalidQuery(format!(
                "field [{}] is not a dense_vector field",
                query.target_field
            )));
        }
        if !index.schema.dense_vector().indexed {
            return Err(Error::InvalidQuery(format!(
                "field [{}] is not indexed; knn search requires an indexed dense_vector",
                query.target_field
            )));
        }
        query.check_dimensions(index.schema.dimensions())?;
        let similarity = index.schema.similarity();
        if similarity == Similarity::Cosine && magnitude(&query.query_vector) == 0.0 {
            return Err(Error::InvalidQuery("cosine similarity does not support zero-magnitude query vectors".to_string()));
        }

        let mut scored: Vec<(f64, &IndexedDocument)> = index
            .visible
            .iter()
            .map(|doc| (score(similarity, &query.query_vector, &doc.vector), doc))
            .collect();
        // Stable sort: equal scores keep indexing order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(query.num_candidates);
        scored.truncate(query.k);
        Ok(scored
            .into_iter()
            .map(|(score, doc)| SearchHit { document_id: doc.id.clone(), score, source: doc.clone() })
            .collect())
    }

    async fn refresh(&self, target: &str) -> Result<()> {
        let mut indices = self.indices.write().await;
        let index = indices.get_mut(target).ok_or_else(|| Error::NotFound(format!("index '{target}'")))?;
        let pending = std::mem::take(&mut index.pending);
        index.visible.extend(pending);
        Ok(())
    }
}

impl MemoryIndex {
    /// Check a document against the mapping; the error is the item's failure.
    fn admit(&self, doc: &IndexedDocument) -> std::result::Result<(), BulkItemResult> {
        if self.ids.contains(&doc.id) {
            return Err(BulkItemResult::failed(
                &doc.id,
                409,
                "version_conflict_engine_exception",
                format!("[{}]: version conflict, document already exists", doc.id),
            ));
        }
        let dims = self.schema.dimensions();
        if doc.vector.len() != dims {
            return Err(BulkItemResult::failed(
                &doc.id,
                400,
                "document_parsing_exception",
                format!(
                    "the [dense_vector] field [{}] has {} dimensions, the mapping defines {}",
                    self.schema.vector_field(),
                    doc.vector.len(),
                    dims
                ),
            ));
        }
        let norm = magnitude(&doc.vector);
        match self.schema.similarity() {
            Similarity::Cosine if norm == 0.0 => Err(BulkItemResult::failed(
                &doc.id,
                400,
                "document_parsing_exception",
                "the [cosine] similarity does not support vectors with zero magnitude",
            )),
            Similarity::DotProduct if (norm - 1.0).abs() > UNIT_LENGTH_TOLERANCE => Err(BulkItemResult::failed(
                &doc.id,
                400,
                "document_parsing_exception",
                format!("the [dot_product] similarity can only be used with unit-length vectors (length {norm})"),
            )),
            _ => Ok(()),
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn magnitude(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

/// Engine-convention score of `doc` for `query`; higher is better.
pub fn score(similarity: Similarity, query: &[f64], doc: &[f64]) -> f64 {
    match similarity {
        Similarity::Cosine => {
            let denom = magnitude(query) * magnitude(doc);
            let cos = if denom == 0.0 { 0.0 } else { dot(query, doc) / denom };
            (1.0 + cos) / 2.0
        }
        Similarity::DotProduct => (1.0 + dot(query, doc)) / 2.0,
        Similarity::L2Norm => {
            let d2: f64 = query.iter().zip(doc).map(|(x, y)| (x - y) * (x - y)).sum();
            1.0 / (1.0 + d2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one_under_every_metric() {
        let v = [0.6, 0.8];
        for sim in [Similarity::Cosine, Similarity::DotProduct, Similarity::L2Norm] {
            assert!((score(sim, &v, &v) - 1.0).abs() < 1e-12, "{sim}");
        }
    }

    #[test]
    fn opposite_vectors_score_zero_under_cosine() {
        assert!(score(Similarity::Cosine, &[1.0, 0.0], &[-1.0, 0.0]).abs() < 1e-12);
    }

    #[test]
    fn l2_score_decreases_with_distance() {
        let q = [0.0, 0.0];
        assert!(score(Similarity::L2Norm, &q, &[1.0, 0.0]) > score(Similarity::L2Norm, &q, &[2.0, 0.0]));
    }
}
