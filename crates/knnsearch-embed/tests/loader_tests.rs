use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use knnsearch_core::error::Error;
use knnsearch_embed::{load_documents, load_embeddings, load_queries};

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write fixture");
    path
}

fn vector_literal(seed: usize, dims: usize) -> String {
    let values: Vec<String> = (0..dims).map(|i| format!("{:.4}", ((seed + i) % 7) as f64 * 0.1 - 0.3)).collect();
    format!("[{}]", values.join(","))
}

#[test]
fn every_well_formed_row_becomes_one_entry() {
    let tmp = TempDir::new().expect("tmp");
    let n = 25;
    let mut content = String::from("id\tembedding\n");
    for i in 0..n {
        content.push_str(&format!("input-{i}\t{}\n", vector_literal(i, 16)));
    }
    let path = write(&tmp, "embeddings.tsv", &content);

    let store = load_embeddings(&path, Some(16)).expect("load");
    assert_eq!(store.len(), n);
    let ids: HashSet<&str> = store.ids().collect();
    assert_eq!(ids.len(), n, "no duplicated keys");
    for i in 0..n {
        assert!(store.contains(&format!("input-{i}")), "input-{i} was lost");
    }
    assert_eq!(store.vector("input-0").map(<[f64]>::len), Some(16));
}

#[test]
fn unparseable_vector_fails_the_whole_load() {
    let tmp = TempDir::new().expect("tmp");
    let path = write(&tmp, "embeddings.tsv", "id\tembedding\na\t[0.1,0.2]\nb\t[0.1,oops]\nc\t[0.3,0.4]\n");
    let err = load_embeddings(&path, None).expect_err("malformed row");
    match err {
        Error::MalformedEmbedding { line, id, .. } => {
            assert_eq!(line, 3);
            assert_eq!(id, "b");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn wrong_vector_length_is_malformed() {
    let tmp = TempDir::new().expect("tmp");
    let path = write(&tmp, "embeddings.tsv", "id\tembedding\na\t[0.1,0.2,0.3]\n");
    let err = load_embeddings(&path, Some(4)).expect_err("dims");
    assert!(matches!(err, Error::MalformedEmbedding { ref id, .. } if id == "a"));
}

#[test]
fn duplicate_ids_are_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let path = write(&tmp, "embeddings.tsv", "id\tembedding\na\t[1.0]\na\t[2.0]\n");
    assert!(matches!(load_embeddings(&path, None), Err(Error::MalformedEmbedding { line: 3, .. })));
}

#[test]
fn missing_resource_is_source_not_found() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("nope.tsv");
    match load_embeddings(&path, None) {
        Err(Error::SourceNotFound { path: p }) => assert_eq!(p, path),
        other => panic!("expected SourceNotFound, got {other:?}"),
    }
    assert!(matches!(load_documents(&path), Err(Error::SourceNotFound { .. })));
}

#[test]
fn documents_keep_file_order() {
    let tmp = TempDir::new().expect("tmp");
    let path = write(
        &tmp,
        "documents.tsv",
        "id\ttext\ninput-2\tapple crumble\ninput-1\tbanana muffin with chocolate chips\n",
    );
    let docs = load_documents(&path).expect("docs");
    let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["input-2", "input-1"]);
    assert_eq!(docs[1].text, "banana muffin with chocolate chips");
}

#[test]
fn queries_without_embeddings_stay_unresolved() {
    let tmp = TempDir::new().expect("tmp");
    let emb = write(&tmp, "embeddings.tsv", "id\tembedding\nq-1\t[0.1,0.2]\n");
    let qs = write(&tmp, "queries.tsv", "id\ttext\nq-1\trice\nq-9\tindian curry\n");
    let store = load_embeddings(&emb, Some(2)).expect("store");
    let queries = load_queries(&qs, &store).expect("queries");
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].vector.as_deref(), Some(&[0.1, 0.2][..]));
    assert_eq!(queries[1].label, "indian curry");
    assert!(queries[1].vector.is_none());
}

#[test]
fn embedding_row_with_extra_fields_is_malformed() {
    let tmp = TempDir::new().expect("tmp");
    let path = write(&tmp, "embeddings.tsv", "id\tembedding\na\t[0.1,0.2]\nb\t[0.1,0.2]\t[9.9]\n");
    match load_embeddings(&path, None) {
        Err(Error::MalformedEmbedding { line, id, .. }) => assert_eq!((line, id.as_str()), (3, "b")),
        other => panic!("expected MalformedEmbedding, got {other:?}"),
    }
}

#[test]
fn document_row_with_extra_fields_reports_its_line() {
    let tmp = TempDir::new().expect("tmp");
    let path = write(&tmp, "documents.tsv", "id\ttext\ninput-1\tapple pie\ninput-2\tbanana\tmuffin with chips\n");
    match load_documents(&path) {
        Err(Error::MalformedRow { path: p, line, .. }) => {
            assert_eq!(p, path);
            assert_eq!(line, 3);
        }
        other => panic!("expected MalformedRow, got {other:?}"),
    }
}

#[test]
fn quoted_document_text_may_contain_tabs() {
    let tmp = TempDir::new().expect("tmp");
    let path = write(&tmp, "documents.tsv", "id\ttext\ninput-1\t\"banana\tmuffin\"\n");
    let docs = load_documents(&path).expect("docs");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].text, "banana\tmuffin");
}
