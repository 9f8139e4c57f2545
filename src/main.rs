use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use usage_insights::config::Config;
use usage_insights::execution::engine::ExecutionOutcome;
use usage_insights::execution_loop::attempt::{AttemptRecord, PipelineResult, RunState};
use usage_insights::execution_loop::orchestrator::RunObserver;
use usage_insights::metadata::shared_cache;
use usage_insights::service::InsightsService;

#[derive(Parser)]
#[command(name = "usage-insights")]
#[command(about = "Report usage insights: ask Power BI usage metrics questions in plain English")]
struct Args {
    /// Max DAX retries (or set MAX_DAX_RETRIES)
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Workspace catalogue (or set WORKSPACES_FILE)
    #[arg(long, global = true)]
    workspaces_file: Option<PathBuf>,

    /// Static model description sent as system context (or set CONTEXT_FILE)
    #[arg(long, global = true)]
    context_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question against one report workspace
    Ask {
        /// Workspace name as listed in the catalogue
        #[arg(short, long)]
        workspace: String,

        /// Describe your requirement
        question: String,
    },
    /// List the report workspaces in the catalogue
    Workspaces {
        /// Re-read the reference files even if the cached copy is fresh
        #[arg(long)]
        reload: bool,
    },
}

/// Prints each step of a run, the way the form UI showed its spinners
struct ConsoleObserver {
    max_retries: u32,
}

impl RunObserver for ConsoleObserver {
    fn on_state(&self, state: RunState) {
        match state {
            RunState::Init => println!("Authenticating to Power BI…"),
            RunState::Authenticated => println!("Authenticated"),
            RunState::Synthesizing { attempt } => {
                println!("[{}/{}] Generating DAX…", attempt, self.max_retries)
            }
            RunState::Executing { .. } => println!("Executing DAX…"),
            RunState::Succeeded { .. } => println!("Query succeeded"),
            RunState::Exhausted => {
                println!("All retry attempts failed. Please refine your question.")
            }
            RunState::Interpreted | RunState::Failed => {}
        }
    }

    fn on_attempt(&self, record: &AttemptRecord) {
        if let Some(query) = record.query() {
            println!("\n{}\n", query);
        }
        if let ExecutionOutcome::Failure(failure) = &record.outcome {
            println!("Exec failed: {}", failure);
            if record.attempt_number < self.max_retries {
                println!("Retrying…");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    if let Some(path) = args.workspaces_file {
        config.workspaces_file = path;
    }
    if let Some(path) = args.context_file {
        config.context_file = path;
    }

    match args.command {
        // Only needs the catalogue, so no credentials are required
        Command::Workspaces { reload } => {
            let cache = shared_cache(&config.reference_source(), config.reference_ttl);
            let data = if reload { cache.reload()? } else { cache.get()? };
            for name in data.workspace_names() {
                println!("{}", name);
            }
        }
        Command::Ask {
            workspace,
            question,
        } => {
            let service = InsightsService::from_config(&config)?;
            info!("Question: {}", question);
            let observer = Arc::new(ConsoleObserver {
                max_retries: config.max_retries,
            });
            let result = service.ask(&workspace, &question, Some(observer)).await?;

            match result {
                PipelineResult::Answered { ref narrative, .. } => {
                    println!("\n=== Insight ===");
                    println!("{}", narrative);
                }
                PipelineResult::Exhausted { .. } => {
                    println!("\n{}", result);
                    bail!("no DAX query succeeded within {} attempts", config.max_retries);
                }
                PipelineResult::Failed { error, .. } => {
                    bail!(error);
                }
            }
        }
    }

    Ok(())
}
