//! Source-document and labeled-query loaders.
//!
//! Both resources are `id<TAB>text` tables. Documents keep file order, which
//! is also the order they are submitted in the bulk request.

use std::path::Path;

use knnsearch_core::error::{Error, Result};
use knnsearch_core::tsv::{read_tsv, TsvTable};
use knnsearch_core::types::{EmbeddingStore, LabeledQuery, SourceDocument};

pub const TEXT_COLUMN: &str = "text";

pub fn load_documents(path: &Path) -> Result<Vec<SourceDocument>> {
    let table = read_tsv(path)?;
    let docs = id_text_rows(&table, path)?
        .into_iter()
        .map(|(id, text)| SourceDocument { id, text })
        .collect::<Vec<_>>();
    tracing::info!(path = %path.display(), count = docs.len(), "loaded source documents");
    Ok(docs)
}

/// Read query labels and attach their vectors from `store`.
///
/// A query id with no embedding is kept with `vector: None` so the runner can
/// report it without aborting the other queries.
pub fn load_queries(path: &Path, store: &EmbeddingStore) -> Result<Vec<LabeledQuery>> {
    let table = read_tsv(path)?;
    let queries = id_text_rows(&table, path)?
        .into_iter()
        .map(|(id, label)| {
            let vector = store.vector(&id).map(<[f64]>::to_vec);
            if vector.is_none() {
                tracing::warn!(query_id = %id, "query has no embedding");
            }
            LabeledQuery { id, label, vector }
        })
        .collect::<Vec<_>>();
    tracing::info!(path = %path.display(), count = queries.len(), "loaded queries");
    Ok(queries)
}

fn id_text_rows(table: &TsvTable, path: &Path) -> Result<Vec<(String, String)>> {
    let missing = |col: &str| {
        Error::Operation(format!("{}: header has no '{}' column", path.display(), col))
    };
    let id_col = table.column("id").ok_or_else(|| missing("id"))?;
    let text_col = table.column(TEXT_COLUMN).ok_or_else(|| missing(TEXT_COLUMN))?;
    table
        .rows()
        .iter()
        .map(|row| match (row.get(id_col), row.get(text_col)) {
            (Some(id), Some(text)) if !id.is_empty() => Ok((id.to_string(), text.to_string())),
            _ => Err(Error::Operation(format!(
                "{}:{}: expected an id and a text cell",
                path.display(),
                row.line
            ))),
        })
        .collect()
}
