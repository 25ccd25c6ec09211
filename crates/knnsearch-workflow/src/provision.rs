use knnsearch_core::error::Result;
use knnsearch_core::traits::SearchClient;
use knnsearch_core::types::{DeleteOutcome, IndexSchema};

/// Creates the KNN index, optionally dropping a previous one first.
pub struct IndexProvisioner<'a, C: ?Sized> {
    client: &'a C,
    max_dims: usize,
    recreate: bool,
}

impl<'a, C> IndexProvisioner<'a, C>
where
    C: SearchClient + ?Sized,
{
    pub fn new(client: &'a C, max_dims: usize) -> Self {
        Self { client, max_dims, recreate: false }
    }

    #[must_use]
    pub fn recreate(mut self, recreate: bool) -> Self {
        self.recreate = recreate;
        self
    }

    /// Returns once the engine has acknowledged the new index.
    pub async fn provision(&self, name: &str, schema: &IndexSchema) -> Result<()> {
        schema.validate(self.max_dims)?;
        if self.recreate {
            match self.client.delete_index(name).await? {
                DeleteOutcome::Deleted => tracing::info!(index = name, "deleted existing index"),
                DeleteOutcome::Absent => tracing::debug!(index = name, "no previous index to delete"),
            }
        }
        self.client.create_index(name, schema).await?;
        tracing::info!(
            index = name,
            dims = schema.dimensions(),
            similarity = %schema.similarity(),
            "created index"
        );
        Ok(())
    }
}
