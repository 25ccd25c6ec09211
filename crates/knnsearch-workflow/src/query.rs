//! KNN query loop.
//!
//! Queries run with bounded concurrency; reports come back in input order. A
//! failing query is logged and recorded, never allowed to stop the loop.

use futures::stream::{self, StreamExt};

use knnsearch_core::error::{Error, Result};
use knnsearch_core::traits::SearchClient;
use knnsearch_core::types::{IndexSchema, LabeledQuery, QuerySpec, SearchHit};

pub const DEFAULT_K: usize = 3;
pub const DEFAULT_NUM_CANDIDATES: usize = 3;

/// Outcome of one labeled query.
#[derive(Debug)]
pub struct QueryReport {
    pub query_id: String,
    pub label: String,
    /// `Ok(vec![])` means the engine answered with no hits.
    pub outcome: std::result::Result<Vec<SearchHit>, Error>,
}

impl QueryReport {
    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn hits(&self) -> &[SearchHit] {
        match &self.outcome {
            Ok(hits) => hits,
            Err(_) => &[],
        }
    }

    /// Human-readable block:
    ///
    /// ```text
    /// query for vector of rice:
    /// input-7 - 0.93: chicken teriyaki with rice
    /// ---
    /// ```
    pub fn render(&self) -> String {
        let mut out = format!("query for vector of {}:\n", self.label);
        match &self.outcome {
            Ok(hits) if hits.is_empty() => out.push_str("(no hits)\n"),
            Ok(hits) => {
                for hit in hits {
                    out.push_str(&format!("{} - {}: {}\n", hit.document_id, hit.score, hit.source.text));
                }
            }
            Err(err) => out.push_str(&format!("query failed: {err}\n")),
        }
        out.push_str("---\n");
        out
    }
}

pub struct QueryRunner<'a, C: ?Sized> {
    client: &'a C,
    target: String,
    field: String,
    dimensions: usize,
    k: usize,
    num_candidates: usize,
    concurrency: usize,
}

impl<'a, C> QueryRunner<'a, C>
where
    C: SearchClient + ?Sized,
{
    /// Runner for `target` using the vector field and dimensionality of `schema`.
    pub fn new(client: &'a C, target: &str, schema: &IndexSchema) -> Self {
        Self {
            client,
            target: target.to_string(),
            field: schema.vector_field().to_string(),
            dimensions: schema.dimensions(),
            k: DEFAULT_K,
            num_candidates: DEFAULT_NUM_CANDIDATES,
            concurrency: 1,
        }
    }

    #[must_use]
    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    #[must_use]
    pub fn num_candidates(mut self, num_candidates: usize) -> Self {
        self.num_candidates = num_candidates;
        self
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn run(&self, queries: &[LabeledQuery]) -> Vec<QueryReport> {
        self.run_with(queries, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_report` as each report completes.
    pub async fn run_with<F>(&self, queries: &[LabeledQuery], mut on_report: F) -> Vec<QueryReport>
    where
        F: FnMut(&QueryReport),
    {
        let mut reports = Vec::with_capacity(queries.len());
        let mut pending = stream::iter(queries).map(|q| self.run_one(q)).buffered(self.concurrency);
        while let Some(report) = pending.next().await {
            on_report(&report);
            reports.push(report);
        }
        let failed = reports.iter().filter(|r| r.is_failure()).count();
        tracing::info!(index = %self.target, queries = reports.len(), failed, "query loop finished");
        reports
    }

    async fn run_one(&self, query: &LabeledQuery) -> QueryReport {
        let outcome = self.search(query).await.map_err(|err| {
            if err.is_fatal() {
                Error::QueryFailure { query_id: query.id.clone(), reason: err.to_string() }
            } else {
                err
            }
        });
        match &outcome {
            Ok(hits) => tracing::debug!(query_id = %query.id, hits = hits.len(), "query answered"),
            Err(err) => tracing::warn!(query_id = %query.id, error = %err, "query failed"),
        }
        QueryReport { query_id: query.id.clone(), label: query.label.clone(), outcome }
    }

    async fn search(&self, query: &LabeledQuery) -> Result<Vec<SearchHit>> {
        let vector = query.vector.clone().ok_or_else(|| Error::QueryFailure {
            query_id: query.id.clone(),
            reason: "no embedding for query id".to_string(),
        })?;
        let spec = QuerySpec::new(self.field.as_str(), vector, self.k, self.num_candidates)?;
        spec.check_dimensions(self.dimensions)?;
        self.client.search(&self.target, &spec).await
    }
}
