//! Embedding Store Loader.
//!
//! Reads a tab-separated resource with (at least) an `id` and an `embedding`
//! column. The embedding cell holds a JSON array literal such as
//! `[0.01,-0.02,0.3]`. Any row that cannot be turned into a vector fails the
//! whole load; there is no partial store.

use std::collections::HashMap;
use std::path::Path;

use knnsearch_core::error::{Error, Result};
use knnsearch_core::tsv::{read_source, TsvTable};
use knnsearch_core::types::{EmbeddingRecord, EmbeddingStore};

pub const ID_COLUMN: &str = "id";
pub const EMBEDDING_COLUMN: &str = "embedding";

/// Load `path` into an [`EmbeddingStore`].
///
/// When `expected_dims` is set every vector must have exactly that length.
pub fn load_embeddings(path: &Path, expected_dims: Option<usize>) -> Result<EmbeddingStore> {
    let content = read_source(path)?;
    let table = TsvTable::parse(&content).map_err(|e| Error::MalformedEmbedding {
        line: e.line,
        id: e.first_cell,
        reason: e.reason,
    })?;
    let store = parse_embeddings(&table, expected_dims)?;
    tracing::info!(path = %path.display(), count = store.len(), "loaded embeddings");
    Ok(store)
}

pub fn parse_embeddings(table: &TsvTable, expected_dims: Option<usize>) -> Result<EmbeddingStore> {
    let id_col = require_column(table, ID_COLUMN)?;
    let emb_col = require_column(table, EMBEDDING_COLUMN)?;

    let mut records: HashMap<String, EmbeddingRecord> = HashMap::with_capacity(table.len());
    for row in table.rows() {
        let id = row.get(id_col).unwrap_or_default().to_string();
        let malformed = |reason: String| Error::MalformedEmbedding { line: row.line, id: id.clone(), reason };
        if id.is_empty() {
            return Err(malformed("empty id".to_string()));
        }
        let cell = row
            .get(emb_col)
            .ok_or_else(|| malformed(format!("missing '{EMBEDDING_COLUMN}' cell")))?;
        let vector: Vec<f64> = serde_json::from_str(cell)
            .map_err(|e| malformed(format!("not a numeric array: {e}")))?;
        if let Some(dims) = expected_dims {
            if vector.len() != dims {
                return Err(malformed(format!("expected {dims} values, got {}", vector.len())));
            }
        }
        if records.contains_key(&id) {
            return Err(malformed("duplicate id".to_string()));
        }
        records.insert(id.clone(), EmbeddingRecord { id, vector });
    }
    Ok(EmbeddingStore::new(records))
}

fn require_column(table: &TsvTable, name: &str) -> Result<usize> {
    table.column(name).ok_or_else(|| Error::MalformedEmbedding {
        line: 1,
        id: String::new(),
        reason: format!("header has no '{name}' column"),
    })
}
