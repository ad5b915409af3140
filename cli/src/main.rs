//! GraphRAG Entry Point
//!
//! Command-line front end for the on-device retrieval engine:
//! - ingest: embed regulation and workflow feeds into the index snapshot
//! - search: query the snapshot, optionally personalized for a user
//! - status: report memory, model and index state
//!
//! Command output is JSON on stdout; logs go to stderr.

use clap::{Parser, Subcommand};
use graphrag_cli::{read_regulations, read_workflow_steps, CliError, CliResult, RetrievalService};
use graphrag_core::{EngineConfig, SearchDomain, UserSearchContext};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SNAPSHOT: &str = ".graphrag/index.bin";

#[derive(Parser)]
#[command(name = "graphrag")]
#[command(about = "On-device embedding and retrieval for regulations and workflow history")]
#[command(version)]
struct Args {
    /// JSON configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed feeds and append them to the index snapshot
    Ingest {
        /// Regulation feed (JSON Lines, one regulation per line)
        #[arg(long)]
        regulations: Option<PathBuf>,

        /// Workflow feed (JSON Lines, one step per line)
        #[arg(long)]
        workflows: Option<PathBuf>,

        #[arg(long, default_value = DEFAULT_SNAPSHOT)]
        snapshot: PathBuf,
    },

    /// Search the index snapshot
    Search {
        query: String,

        /// Restrict to one domain: regulations or user-history
        #[arg(long)]
        domain: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        /// Personalize with this user context (JSON object)
        #[arg(long)]
        user_context: Option<String>,

        #[arg(long, default_value = DEFAULT_SNAPSHOT)]
        snapshot: PathBuf,
    },

    /// Report memory, model and index state
    Status {
        #[arg(long, default_value = DEFAULT_SNAPSHOT)]
        snapshot: PathBuf,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestSummary {
    regulation_records: usize,
    workflow_records: usize,
    cancelled: bool,
    snapshot: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(args: Args) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    let service = RetrievalService::new(config);

    let result = match args.command {
        Command::Ingest {
            regulations,
            workflows,
            snapshot,
        } => ingest(&service, regulations, workflows, &snapshot).await,
        Command::Search {
            query,
            domain,
            limit,
            user_context,
            snapshot,
        } => {
            let domain = domain
                .map(|d| d.parse::<SearchDomain>().map_err(CliError::InvalidArgument))
                .transpose()?;
            let context = user_context
                .map(|raw| serde_json::from_str::<UserSearchContext>(&raw))
                .transpose()?;
            search(&service, &query, domain, limit, context, &snapshot).await
        }
        Command::Status { snapshot } => {
            service.initialize(Some(&snapshot)).await?;
            print_json(&service.status().await?)
        }
    };

    service.shutdown().await;
    result
}

fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

async fn ingest(
    service: &RetrievalService,
    regulations: Option<PathBuf>,
    workflows: Option<PathBuf>,
    snapshot: &Path,
) -> CliResult<()> {
    if regulations.is_none() && workflows.is_none() {
        return Err(CliError::InvalidArgument(
            "ingest needs --regulations and/or --workflows".to_string(),
        ));
    }

    // Parse feeds before touching the index so a bad line changes nothing
    let documents = regulations.as_deref().map(read_regulations).transpose()?;
    let steps = workflows.as_deref().map(read_workflow_steps).transpose()?;

    service.initialize(Some(snapshot)).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing the current sub-batch");
            on_interrupt.cancel();
        }
    });

    let mut summary = IngestSummary {
        regulation_records: 0,
        workflow_records: 0,
        cancelled: false,
        snapshot: snapshot.to_path_buf(),
    };

    if let Some(documents) = documents {
        let report = service.ingest_regulations(&documents, &cancel).await?;
        summary.regulation_records = report.stored_count();
        summary.cancelled |= report.cancelled;
    }
    if let Some(steps) = steps.filter(|_| !summary.cancelled) {
        let report = service.ingest_workflows(&steps, &cancel).await?;
        summary.workflow_records = report.stored_count();
        summary.cancelled |= report.cancelled;
    }

    // Partial progress is kept on cancellation
    service.save_snapshot(snapshot).await?;
    tracing::info!(
        "Stored {} regulation and {} workflow records",
        summary.regulation_records,
        summary.workflow_records
    );
    print_json(&summary)
}

async fn search(
    service: &RetrievalService,
    query: &str,
    domain: Option<SearchDomain>,
    limit: Option<usize>,
    context: Option<UserSearchContext>,
    snapshot: &Path,
) -> CliResult<()> {
    service.initialize(Some(snapshot)).await?;
    let limit = limit.unwrap_or(service.config().search.default_limit);

    let response = match context {
        Some(context) => {
            service.record_user_context(context.clone()).await?;
            service.search_personalized(query, &context, limit).await
        }
        None => service.search(query, domain, limit).await,
    };
    print_json(&response)
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
