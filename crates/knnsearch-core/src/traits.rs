use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BulkItemResult, BulkOperation, DeleteOutcome, IndexSchema, QuerySpec, SearchHit};

/// The search engine as seen by the workflow.
///
/// Every method is a network round-trip in the HTTP implementation and may be
/// dropped mid-flight; implementations must not hold local copies of indexed
/// state that could drift from the engine.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Delete an index. A missing index is `DeleteOutcome::Absent`, not an error.
    async fn delete_index(&self, name: &str) -> Result<DeleteOutcome>;

    /// Create an index and wait for the engine to acknowledge it.
    async fn create_index(&self, name: &str, schema: &IndexSchema) -> Result<()>;

    /// Submit every operation in one request and return one result per item,
    /// in submission order.
    async fn bulk(&self, target: &str, operations: &[BulkOperation]) -> Result<Vec<BulkItemResult>>;

    /// Approximate nearest-neighbour search; hits come back best first.
    async fn search(&self, target: &str, query: &QuerySpec) -> Result<Vec<SearchHit>>;

    /// Make everything indexed so far visible to `search`.
    async fn refresh(&self, target: &str) -> Result<()>;
}
