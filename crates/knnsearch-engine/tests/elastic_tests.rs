use std::time::Duration;

use knnsearch_core::error::Error;
use knnsearch_core::traits::SearchClient;
use knnsearch_core::types::{
    BulkOperation, DeleteOutcome, DenseVectorField, IndexSchema, IndexedDocument, QuerySpec,
    Similarity,
};
use knnsearch_engine::ElasticClient;
use mockito::{Matcher, Server};
use serde_json::json;

fn client(server: &Server) -> ElasticClient {
    ElasticClient::new(&server.url(), Duration::from_secs(5)).expect("client")
}

fn schema() -> IndexSchema {
    IndexSchema::new(DenseVectorField::new(3, Similarity::Cosine), 1024).expect("schema")
}

#[tokio::test]
async fn delete_of_missing_index_is_absent() {
    let mut server = Server::new_async().await;
    let missing = server
        .mock("DELETE", "/knn-test")
        .with_status(404)
        .with_body(r#"{"error":{"type":"index_not_found_exception","reason":"no such index [knn-test]"},"status":404}"#)
        .create_async()
        .await;
    let outcome = client(&server).delete_index("knn-test").await.expect("delete");
    assert_eq!(outcome, DeleteOutcome::Absent);
    missing.assert_async().await;
}

#[tokio::test]
async fn delete_server_error_is_fatal() {
    let mut server = Server::new_async().await;
    server.mock("DELETE", "/knn-test").with_status(500).with_body("boom").create_async().await;
    let err = client(&server).delete_index("knn-test").await.expect_err("500");
    assert!(matches!(err, Error::Operation(_)));
}

#[tokio::test]
async fn create_sends_dense_vector_mapping() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("PUT", "/knn-test")
        .match_body(Matcher::PartialJson(json!({
            "mappings": { "properties": { "vector": { "type": "dense_vector", "dims": 3, "similarity": "cosine" } } }
        })))
        .with_status(200)
        .with_body(r#"{"acknowledged":true,"shards_acknowledged":true,"index":"knn-test"}"#)
        .create_async()
        .await;
    client(&server).create_index("knn-test", &schema()).await.expect("create");
    create.assert_async().await;
}

#[tokio::test]
async fn create_maps_engine_rejections() {
    let mut server = Server::new_async().await;
    server
        .mock("PUT", "/exists")
        .with_status(400)
        .with_body(r#"{"error":{"type":"resource_already_exists_exception","reason":"index [exists] already exists"}}"#)
        .create_async()
        .await;
    server
        .mock("PUT", "/bad")
        .with_status(400)
        .with_body(r#"{"error":{"type":"mapper_parsing_exception","reason":"dims too large"}}"#)
        .create_async()
        .await;
    let c = client(&server);
    assert!(matches!(c.create_index("exists", &schema()).await, Err(Error::AlreadyExists(_))));
    assert!(matches!(c.create_index("bad", &schema()).await, Err(Error::SchemaInvalid(_))));
}

#[tokio::test]
async fn bulk_returns_item_results_in_order() {
    let mut server = Server::new_async().await;
    let bulk = server
        .mock("POST", "/knn-test/_bulk")
        .match_header("content-type", "application/x-ndjson")
        .with_status(200)
        .with_body(
            json!({
                "took": 3,
                "errors": true,
                "items": [
                    { "create": { "_id": "input-1", "status": 201 } },
                    { "create": { "_id": "input-2", "status": 409,
                      "error": { "type": "version_conflict_engine_exception", "reason": "already exists" } } }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let ops: Vec<BulkOperation> = ["input-1", "input-2"]
        .into_iter()
        .map(|id| BulkOperation::Create(IndexedDocument { id: id.into(), text: "t".into(), vector: vec![1.0, 0.0, 0.0] }))
        .collect();
    let results = client(&server).bulk("knn-test", &ops).await.expect("bulk");
    assert_eq!(results.len(), 2);
    assert!(results[0].is_success());
    assert!(!results[1].is_success());
    assert_eq!(results[1].id, "input-2");
    assert_eq!(results[1].error.as_ref().map(|e| e.kind.as_str()), Some("version_conflict_engine_exception"));
    bulk.assert_async().await;
}

#[tokio::test]
async fn empty_bulk_sends_nothing() {
    let server = Server::new_async().await;
    let results = client(&server).bulk("knn-test", &[]).await.expect("bulk");
    assert!(results.is_empty());
}

#[tokio::test]
async fn search_sends_knn_clause_and_parses_hits() {
    let mut server = Server::new_async().await;
    let search = server
        .mock("POST", "/knn-test/_search")
        .match_body(Matcher::PartialJson(json!({
            "knn": { "field": "vector", "k": 3, "num_candidates": 3 }
        })))
        .with_status(200)
        .with_body(
            json!({
                "hits": { "total": { "value": 2 }, "hits": [
                    { "_id": "input-1", "_score": 1.0, "_source": { "id": "input-1", "text": "banana muffin", "vector": [1.0, 0.0, 0.0] } },
                    { "_id": "input-2", "_score": 0.75, "_source": { "id": "input-2", "text": "apple pie" } }
                ] }
            })
            .to_string(),
        )
        .create_async()
        .await;
    let spec = QuerySpec::new("vector", vec![1.0, 0.0, 0.0], 3, 3).expect("spec");
    let hits = client(&server).search("knn-test", &spec).await.expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].document_id, "input-1");
    assert_eq!(hits[0].source.text, "banana muffin");
    assert!((hits[1].score - 0.75).abs() < f64::EPSILON);
    search.assert_async().await;
}

#[tokio::test]
async fn search_with_no_hits_is_empty_not_an_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/knn-test/_search")
        .with_status(200)
        .with_body(r#"{"hits":{"total":{"value":0},"hits":[]}}"#)
        .create_async()
        .await;
    let spec = QuerySpec::new("vector", vec![1.0, 0.0, 0.0], 3, 3).expect("spec");
    assert!(client(&server).search("knn-test", &spec).await.expect("search").is_empty());
}

#[tokio::test]
async fn search_maps_missing_index_and_bad_queries() {
    let mut server = Server::new_async().await;
    server.mock("POST", "/gone/_search").with_status(404).with_body("{}").create_async().await;
    server
        .mock("POST", "/knn-test/_search")
        .with_status(400)
        .with_body(r#"{"error":{"type":"illegal_argument_exception","reason":"query vector has wrong dims"}}"#)
        .create_async()
        .await;
    let c = client(&server);
    let spec = QuerySpec::new("vector", vec![1.0, 0.0], 3, 3).expect("spec");
    assert!(matches!(c.search("gone", &spec).await, Err(Error::NotFound(_))));
    assert!(matches!(c.search("knn-test", &spec).await, Err(Error::InvalidQuery(_))));
}

#[tokio::test]
async fn refresh_hits_the_refresh_endpoint() {
    let mut server = Server::new_async().await;
    let refresh = server
        .mock("POST", "/knn-test/_refresh")
        .with_status(200)
        .with_body(r#"{"_shards":{"total":2,"successful":1,"failed":0}}"#)
        .create_async()
        .await;
    client(&server).refresh("knn-test").await.expect("refresh");
    refresh.assert_async().await;
}
