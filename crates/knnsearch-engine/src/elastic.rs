//! Elasticsearch-compatible REST client.
//!
//! Speaks the handful of endpoints the workflow needs: index create/delete,
//! `_bulk` with `create` actions, `_search` with a `knn` clause and
//! `_refresh`. Retries and authentication are left to the deployment.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use knnsearch_core::error::{Error, Result};
use knnsearch_core::traits::SearchClient;
use knnsearch_core::types::{
    BulkItemResult, BulkOperation, DeleteOutcome, FieldMapping, IndexSchema, IndexedDocument,
    QuerySpec, SearchHit,
};

const ALREADY_EXISTS: &str = "resource_already_exists_exception";

#[derive(Clone)]
pub struct ElasticClient {
    client: Client,
    base_url: String,
}

impl ElasticClient {
    /// Build a client for `base_url` (e.g. `http://localhost:9200`).
    ///
    /// `timeout` bounds every request, connect included.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "engine url must be an http(s) URL, got '{base_url}'"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Operation(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl SearchClient for ElasticClient {
    async fn delete_index(&self, name: &str) -> Result<DeleteOutcome> {
        tracing::debug!(index = name, "DELETE index");
        let resp = self.client.delete(self.url(name)).send().await.map_err(transport)?;
        match resp.status() {
            s if s.is_success() => Ok(DeleteOutcome::Deleted),
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::Absent),
            s => {
                let (_, reason) = error_detail(resp).await;
                Err(Error::Operation(format!("delete index '{name}' failed ({s}): {reason}")))
            }
        }
    }

    async fn create_index(&self, name: &str, schema: &IndexSchema) -> Result<()> {
        let body = index_body(schema);
        tracing::debug!(index = name, body = %body, "PUT index");
        let resp = self.client.put(self.url(name)).json(&body).send().await.map_err(transport)?;
        let status = resp.status();
        if status.is_success() {
            let ack: Acknowledged = resp.json().await.map_err(decode)?;
            if !ack.acknowledged {
                return Err(Error::Operation(format!("creation of index '{name}' was not acknowledged")));
            }
            return Ok(());
        }
        let (kind, reason) = error_detail(resp).await;
        match status {
            StatusCode::BAD_REQUEST if kind == ALREADY_EXISTS => Err(Error::AlreadyExists(name.to_string())),
            StatusCode::BAD_REQUEST => Err(Error::SchemaInvalid(format!("{kind}: {reason}"))),
            s => Err(Error::Operation(format!("create index '{name}' failed ({s}): {reason}"))),
        }
    }

    async fn bulk(&self, target: &str, operations: &[BulkOperation]) -> Result<Vec<BulkItemResult>> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }
        let body = ndjson(operations)?;
        tracing::debug!(index = target, items = operations.len(), bytes = body.len(), "POST _bulk");
        let resp = self
            .client
            .post(self.url(&format!("{target}/_bulk")))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"))
            .body(body)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            let (kind, reason) = error_detail(resp).await;
            return Err(Error::Operation(format!("bulk request failed ({status}): {kind}: {reason}")));
        }
        let payload: BulkResponse = resp.json().await.map_err(decode)?;
        if payload.items.len() != operations.len() {
            return Err(Error::Operation(format!(
                "bulk response has {} items for {} operations",
                payload.items.len(),
                operations.len()
            )));
        }
        Ok(payload
            .items
            .into_iter()
            .zip(operations)
            .map(|(item, op)| item_result(item, op.id()))
            .collect())
    }

    async fn search(&self, target: &str, query: &QuerySpec) -> Result<Vec<SearchHit>> {
        let body = json!({
            "knn": {
                "field": query.target_field,
                "query_vector": query.query_vector,
                "k": query.k,
                "num_candidates": query.num_candidates,
            },
            "size": query.k,
        });
        tracing::debug!(index = target, k = query.k, num_candidates = query.num_candidates, "POST _search");
        let resp = self
            .client
            .post(self.url(&format!("{target}/_search")))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            let (kind, reason) = error_detail(resp).await;
            return Err(match status {
                StatusCode::NOT_FOUND => Error::NotFound(format!("index '{target}'")),
                StatusCode::BAD_REQUEST => Error::InvalidQuery(format!("{kind}: {reason}")),
                s => Error::Operation(format!("search failed ({s}): {reason}")),
            });
        }
        let payload: SearchResponse = resp.json().await.map_err(decode)?;
        Ok(payload.hits.hits.into_iter().map(RawHit::into_hit).collect())
    }

    async fn refresh(&self, target: &str) -> Result<()> {
        tracing::debug!(index = target, "POST _refresh");
        let resp = self
            .client
            .post(self.url(&format!("{target}/_refresh")))
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("index '{target}'"))),
            s => {
                let (_, reason) = error_detail(resp).await;
                Err(Error::Operation(format!("refresh of '{target}' failed ({s}): {reason}")))
            }
        }
    }
}

/// Request body for index creation: the field mappings of `schema`.
pub fn index_body(schema: &IndexSchema) -> Value {
    let mut properties = Map::new();
    for (name, field) in schema.fields() {
        let mapping = match field {
            FieldMapping::Keyword => json!({ "type": "keyword" }),
            FieldMapping::Text => json!({ "type": "text" }),
            FieldMapping::DenseVector(dv) if dv.indexed => json!({
                "type": "dense_vector",
                "dims": dv.dimensions,
                "index": true,
                "similarity": dv.similarity.as_str(),
            }),
            FieldMapping::DenseVector(dv) => json!({
                "type": "dense_vector",
                "dims": dv.dimensions,
                "index": false,
            }),
        };
        properties.insert(name.clone(), mapping);
    }
    json!({ "mappings": { "properties": properties } })
}

fn ndjson(operations: &[BulkOperation]) -> Result<String> {
    let mut body = String::new();
    for op in operations {
        let action = json!({ op.action(): { "_id": op.id() } });
        let source = serde_json::to_string(op.document())
            .map_err(|e| Error::Operation(format!("failed to encode document '{}': {e}", op.id())))?;
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&source);
        body.push('\n');
    }
    Ok(body)
}

fn transport(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Operation(format!("request timed out: {err}"))
    } else {
        Error::Operation(format!("request failed: {err}"))
    }
}

fn decode(err: reqwest::Error) -> Error {
    Error::Operation(format!("unexpected engine response: {err}"))
}

/// Pull `(error.type, error.reason)` out of an engine error body.
async fn error_detail(resp: Response) -> (String, String) {
    let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
    let parsed: Option<Value> = serde_json::from_str(&body).ok();
    match parsed.as_ref().and_then(|v| v.get("error")) {
        Some(Value::Object(err)) => {
            let kind = err.get("type").and_then(Value::as_str).unwrap_or("unknown").to_string();
            let reason = err.get("reason").and_then(Value::as_str).unwrap_or_default().to_string();
            (kind, reason)
        }
        Some(Value::String(reason)) => ("unknown".to_string(), reason.clone()),
        _ => ("unknown".to_string(), body),
    }
}

#[derive(Deserialize)]
struct Acknowledged {
    #[serde(default)]
    acknowledged: bool,
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

fn item_result(entry: Map<String, Value>, fallback_id: &str) -> BulkItemResult {
    // Each item is keyed by its action name: {"create": {...}}.
    let Some(item) = entry.into_iter().next().map(|(_, v)| v) else {
        return BulkItemResult::failed(fallback_id, 0, "unknown", "empty bulk item");
    };
    let id = item.get("_id").and_then(Value::as_str).unwrap_or(fallback_id).to_string();
    let status = item
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(0);
    match item.get("error") {
        Some(err) => {
            let kind = err.get("type").and_then(Value::as_str).unwrap_or("unknown");
            let reason = err.get("reason").and_then(Value::as_str).unwrap_or_default();
            BulkItemResult::failed(id, status, kind, reason)
        }
        None => BulkItemResult::ok(id, status),
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Option<RawSource>,
}

#[derive(Deserialize, Default)]
struct RawSource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    vector: Vec<f64>,
}

impl RawHit {
    fn into_hit(self) -> SearchHit {
        let source = self.source.unwrap_or_default();
        SearchHit {
            score: self.score.unwrap_or_default(),
            source: IndexedDocument {
                id: source.id.unwrap_or_else(|| self.id.clone()),
                text: source.text,
                vector: source.vector,
            },
            document_id: self.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knnsearch_core::types::{DenseVectorField, Similarity};

    #[test]
    fn mappings_declare_keyword_text_and_dense_vector() {
        let schema = IndexSchema::new(DenseVectorField::new(1024, Similarity::Cosine), 1024).expect("schema");
        let body = index_body(&schema);
        let props = &body["mappings"]["properties"];
        assert_eq!(props["id"]["type"], "keyword");
        assert_eq!(props["text"]["type"], "text");
        assert_eq!(props["vector"]["type"], "dense_vector");
        assert_eq!(props["vector"]["dims"], 1024);
        assert_eq!(props["vector"]["index"], true);
        assert_eq!(props["vector"]["similarity"], "cosine");
    }

    #[test]
    fn unindexed_vectors_omit_similarity() {
        let field = DenseVectorField { dimensions: 4, indexed: false, similarity: Similarity::L2Norm };
        let body = index_body(&IndexSchema::new(field, 1024).expect("schema"));
        assert!(body["mappings"]["properties"]["vector"].get("similarity").is_none());
    }

    #[test]
    fn bulk_body_is_action_source_pairs() {
        let doc = IndexedDocument { id: "input-1".into(), text: "banana muffin".into(), vector: vec![0.5, 0.25] };
        let body = ndjson(&[BulkOperation::Create(doc)]).expect("ndjson");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let action: Value = serde_json::from_str(lines[0]).expect("action");
        assert_eq!(action["create"]["_id"], "input-1");
        let source: Value = serde_json::from_str(lines[1]).expect("source");
        assert_eq!(source["text"], "banana muffin");
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            ElasticClient::new("localhost:9200", Duration::from_secs(1)),
            Err(Error::InvalidConfig(_))
        ));
    }
}
