use knnsearch_core::error::{Error, Result};
use knnsearch_core::traits::SearchClient;
use knnsearch_core::types::{BulkOperation, EmbeddingStore, IndexedDocument, SourceDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkSummary {
    pub submitted: usize,
    pub created: usize,
}

pub struct BulkLoader<'a, C: ?Sized> {
    client: &'a C,
}

impl<'a, C> BulkLoader<'a, C>
where
    C: SearchClient + ?Sized,
{
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Join every document with its embedding and submit them as one bulk
    /// request of `create` operations.
    ///
    /// Nothing is sent when any document lacks an embedding. A rejected item
    /// fails the load with the first failing id; all of them are logged.
    pub async fn load(
        &self,
        target: &str,
        documents: &[SourceDocument],
        store: &EmbeddingStore,
    ) -> Result<BulkSummary> {
        let operations = documents
            .iter()
            .map(|doc| IndexedDocument::join(doc, store).map(BulkOperation::Create))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(index = target, documents = operations.len(), "submitting bulk create");
        let results = self.client.bulk(target, &operations).await?;

        let mut first_failure = None;
        let mut created = 0;
        for item in &results {
            if item.is_success() {
                created += 1;
                continue;
            }
            let reason = match &item.error {
                Some(err) => format!("{} ({}): {}", err.kind, item.status, err.reason),
                None => format!("status {}", item.status),
            };
            tracing::error!(index = target, id = %item.id, %reason, "bulk item rejected");
            first_failure.get_or_insert_with(|| Error::BulkItemFailure { id: item.id.clone(), reason });
        }
        if let Some(err) = first_failure {
            return Err(err);
        }

        tracing::info!(index = target, created, "bulk create complete");
        Ok(BulkSummary { submitted: operations.len(), created })
    }
}
