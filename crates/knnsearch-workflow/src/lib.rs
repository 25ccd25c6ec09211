//! knnsearch-workflow
//!
//! The ingestion-and-query workflow over any [`SearchClient`]:
//! load → provision → bulk load → (refresh) → query loop.

pub mod bulk;
pub mod provision;
pub mod query;

use std::time::Duration;

use knnsearch_core::config::{EngineKind, EngineSettings, Settings};
use knnsearch_core::error::Result;
use knnsearch_core::traits::SearchClient;
use knnsearch_core::types::{EmbeddingStore, IndexSchema, LabeledQuery, SourceDocument};
use knnsearch_engine::{ElasticClient, MemoryEngine};

pub use bulk::{BulkLoader, BulkSummary};
pub use provision::IndexProvisioner;
pub use query::{QueryReport, QueryRunner};

/// Build the engine client described by `[engine]`.
pub fn connect(settings: &EngineSettings) -> Result<Box<dyn SearchClient>> {
    Ok(match settings.kind {
        EngineKind::Elastic => {
            tracing::info!(url = %settings.url, "using elasticsearch engine");
            Box::new(ElasticClient::new(&settings.url, Duration::from_secs(settings.timeout_secs))?)
        }
        EngineKind::Memory => {
            tracing::info!("using in-memory engine");
            Box::new(MemoryEngine::new().max_dims(settings.max_dense_vector_dims))
        }
    })
}

/// Everything read from disk before the engine is touched.
#[derive(Debug)]
pub struct Inputs {
    pub store: EmbeddingStore,
    pub documents: Vec<SourceDocument>,
    pub queries: Vec<LabeledQuery>,
}

#[derive(Debug)]
pub struct RunReport {
    pub bulk: BulkSummary,
    pub queries: Vec<QueryReport>,
}

pub struct Workflow<'a, C: ?Sized> {
    client: &'a C,
    settings: Settings,
    schema: IndexSchema,
}

impl<'a, C> Workflow<'a, C>
where
    C: SearchClient + ?Sized,
{
    pub fn new(client: &'a C, settings: Settings) -> Result<Self> {
        settings.validate()?;
        let schema = settings.schema()?;
        Ok(Self { client, settings, schema })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn load_embeddings(&self) -> Result<EmbeddingStore> {
        knnsearch_embed::load_embeddings(&self.settings.data.embeddings, Some(self.schema.dimensions()))
    }

    pub fn load_documents(&self) -> Result<Vec<SourceDocument>> {
        knnsearch_embed::load_documents(&self.settings.data.documents)
    }

    pub fn load_queries(&self, store: &EmbeddingStore) -> Result<Vec<LabeledQuery>> {
        knnsearch_embed::load_queries(&self.settings.data.queries, store)
    }

    /// Read embeddings, documents and queries; any load error is fatal.
    pub fn load_inputs(&self) -> Result<Inputs> {
        let store = self.load_embeddings()?;
        let documents = self.load_documents()?;
        let queries = self.load_queries(&store)?;
        Ok(Inputs { store, documents, queries })
    }

    pub async fn provision(&self) -> Result<()> {
        IndexProvisioner::new(self.client, self.settings.engine.max_dense_vector_dims)
            .recreate(self.settings.index.recreate)
            .provision(&self.settings.index.name, &self.schema)
            .await
    }

    pub async fn ingest(&self, documents: &[SourceDocument], store: &EmbeddingStore) -> Result<BulkSummary> {
        let summary = BulkLoader::new(self.client).load(&self.settings.index.name, documents, store).await?;
        if self.settings.query.refresh_before_query {
            self.client.refresh(&self.settings.index.name).await?;
            tracing::info!(index = %self.settings.index.name, "refreshed index");
        }
        Ok(summary)
    }

    pub async fn query<F>(&self, queries: &[LabeledQuery], on_report: F) -> Vec<QueryReport>
    where
        F: FnMut(&QueryReport),
    {
        let q = &self.settings.query;
        QueryRunner::new(self.client, &self.settings.index.name, &self.schema)
            .k(q.k)
            .num_candidates(q.num_candidates)
            .concurrency(q.concurrency)
            .run_with(queries, on_report)
            .await
    }

    /// The whole workflow. Stops at the first fatal error; query failures are
    /// carried in the report.
    pub async fn run<F>(&self, on_report: F) -> Result<RunReport>
    where
        F: FnMut(&QueryReport),
    {
        let inputs = self.load_inputs()?;
        self.provision().await?;
        let bulk = self.ingest(&inputs.documents, &inputs.store).await?;
        let queries = self.query(&inputs.queries, on_report).await;
        Ok(RunReport { bulk, queries })
    }
}
