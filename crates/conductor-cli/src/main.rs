//! Conductor CLI — submit workflow jobs and drive them against a remote
//! background-agent service.

use std::time::Duration;

use clap::{Parser, Subcommand};
use conductor_cli::commands;
use conductor_core::EngineConfig;

/// Conductor CLI — Job orchestration for remote coding agents
#[derive(Parser)]
#[command(name = "conductor", version, about = "Conductor CLI — Job orchestration for remote coding agents")]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "CONDUCTOR_DB_PATH")]
    db: Option<String>,

    /// Seconds between two poll cycles (overrides CONDUCTOR_POLL_INTERVAL_SECS)
    #[arg(long)]
    interval: Option<u64>,

    /// Base URL of the remote agent API
    #[arg(long, env = "CONDUCTOR_API_BASE_URL")]
    api_base_url: Option<String>,

    /// API key for the remote agent API
    #[arg(long, env = "CONDUCTOR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a workflow file as a new job
    Submit {
        /// Path to the workflow XML file
        file: String,
        /// Override the workflow's model
        #[arg(long)]
        model: Option<String>,
        /// Override the workflow's repository
        #[arg(long)]
        repository: Option<String>,
    },

    /// Poll unfinished jobs until interrupted
    Run {
        /// Run a single poll cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Inspect and manage jobs
    Job {
        #[command(subcommand)]
        action: JobAction,
    },

    /// Work with workflow definition files
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
}

#[derive(Subcommand)]
enum JobAction {
    /// List jobs
    List {
        /// Only show jobs in this status (e.g. RUNNING, FINISHED)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show a job with its prompts and children
    Show {
        /// Job ID
        id: String,
    },
    /// Print the remote agent's replies for a job
    Conversation {
        /// Job ID
        id: String,
    },
    /// Delete a job and its children
    Delete {
        /// Job ID
        id: String,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Parse a workflow file and report its shape
    Validate {
        /// Path to the workflow XML file
        file: String,
    },
}

fn engine_config(cli: &Cli) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    if let Some(secs) = cli.interval.filter(|secs| *secs > 0) {
        config.poll_interval = Duration::from_secs(secs);
    }
    if let Some(url) = cli.api_base_url.as_deref().filter(|u| !u.trim().is_empty()) {
        config.api_base_url = url.trim().to_string();
    }
    if let Some(key) = cli.api_key.as_deref() {
        config.api_key = key.trim().to_string();
    }
    config
}

#[tokio::main]
async fn main() {
    // .env must be loaded before clap reads env-backed arguments
    commands::load_dotenv();
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conductor_core=info,conductor_cli=info".into()),
        )
        .init();

    let config = engine_config(&cli);
    let db = cli
        .db
        .clone()
        .unwrap_or_else(conductor_core::config::default_db_path);

    let result = match cli.command {
        Commands::Submit {
            file,
            model,
            repository,
        } => match commands::init_state(&db, &config) {
            Ok(state) => commands::job::submit(&state, &file, model, repository)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        },

        Commands::Run { once } => match commands::run::require_api_key(&config)
            .and_then(|_| commands::init_state(&db, &config))
        {
            Ok(state) => commands::run::run(&state, &config, once).await,
            Err(e) => Err(e),
        },

        Commands::Job { action } => match commands::init_state(&db, &config) {
            Ok(state) => match action {
                JobAction::List { status } => commands::job::list(&state, status.as_deref())
                    .await
                    .map(|_| ()),
                JobAction::Show { id } => commands::job::show(&state, &id).await,
                JobAction::Conversation { id } => {
                    commands::job::conversation(&state, &id).await
                }
                JobAction::Delete { id } => commands::job::delete(&state, &id).await,
            },
            Err(e) => Err(e),
        },

        Commands::Workflow { action } => match action {
            WorkflowAction::Validate { file } => {
                commands::workflow::validate(&file).await.map(|_| ())
            }
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
