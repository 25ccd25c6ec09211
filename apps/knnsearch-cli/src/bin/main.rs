use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use knnsearch_core::config::{Config, EngineKind};
use knnsearch_core::traits::SearchClient;
use knnsearch_workflow::{QueryReport, Workflow};

const AFTER_HELP: &str = "\
Inputs:
  data.embeddings (default data/embeddings.tsv) is not shipped. Produce it with
  your embedding model: a header `id<TAB>embedding`, then one row per document
  and query id with a JSON array of index.dimensions numbers.

Engines:
  --engine memory keeps the index inside this process only. Use it with `run`;
  `provision`, `ingest` and `query` as separate invocations need a real cluster.";

#[derive(Parser)]
#[command(
    name = "knnsearch",
    version,
    about = "Load precomputed embeddings into a dense-vector index and run KNN queries",
    after_help = AFTER_HELP
)]
struct Cli {
    /// Directory holding config.toml and config.<env>.toml
    #[arg(long, default_value = ".", env = "KNNSEARCH_CONFIG_DIR")]
    config_dir: PathBuf,

    /// Override engine.kind (elastic or memory); memory only lives for one invocation
    #[arg(long)]
    engine: Option<EngineKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Provision, ingest and query in one go
    Run,
    /// (Re)create the index
    Provision,
    /// Bulk-load documents with their embeddings
    Ingest,
    /// Run the labeled queries against an existing index
    Query,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} queries ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

fn print_reports(reports: &[QueryReport]) {
    for report in reports {
        print!("{}", report.render());
    }
}

async fn execute(command: Command, workflow: &Workflow<'_, dyn SearchClient>) -> anyhow::Result<()> {
    match command {
        Command::Run => {
            let inputs = workflow.load_inputs()?;
            workflow.provision().await.context("provisioning failed")?;
            let summary = workflow.ingest(&inputs.documents, &inputs.store).await.context("bulk load failed")?;
            println!("Indexed {} documents into '{}'", summary.created, workflow.settings().index.name);
            let pb = progress_bar(inputs.queries.len());
            let reports = workflow.query(&inputs.queries, |_| pb.inc(1)).await;
            pb.finish_and_clear();
            print_reports(&reports);
        }
        Command::Provision => {
            workflow.provision().await.context("provisioning failed")?;
            println!("Index '{}' is ready", workflow.settings().index.name);
        }
        Command::Ingest => {
            let store = workflow.load_embeddings()?;
            let documents = workflow.load_documents()?;
            let summary = workflow.ingest(&documents, &store).await.context("bulk load failed")?;
            println!("Indexed {} documents into '{}'", summary.created, workflow.settings().index.name);
        }
        Command::Query => {
            let store = workflow.load_embeddings()?;
            let queries = workflow.load_queries(&store)?;
            let pb = progress_bar(queries.len());
            let reports = workflow.query(&queries, |_| pb.inc(1)).await;
            pb.finish_and_clear();
            print_reports(&reports);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load_from(&cli.config_dir)
        .with_context(|| format!("loading configuration from {}", cli.config_dir.display()))?;
    if let Some(kind) = cli.engine {
        config = config.with_engine_override(kind);
    }
    let settings = config.settings().context("invalid configuration")?;
    tracing::info!(env = config.env_name(), index = %settings.index.name, "configuration loaded");

    let client = knnsearch_workflow::connect(&settings.engine)?;
    let workflow = Workflow::new(client.as_ref(), settings)?;

    tokio::select! {
        res = execute(cli.command, &workflow) => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted; the index is left as the engine has it");
            anyhow::bail!("interrupted")
        }
    }
}
