use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::notice::{Notice, NotificationSink, Severity};
use common::{ApiClient, ApiConfig, ApiError, PollingConfig, SessionProvider};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

mod commands;
mod output;
mod render;

use output::{Format, Output};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Operator console for the support assistant backend",
    long_about = None
)]
struct Cli {
    /// Base URL of the API, e.g. http://localhost:8000/api/v1
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Bearer token; overrides the token file
    #[arg(long, global = true)]
    token: Option<String>,
    /// YAML or TOML file with `api` and `polling` sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Format::Table, global = true)]
    format: Format,
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dashboard counters
    Stats,
    /// Counters plus recent activity
    Dashboard,
    /// Engineer applications
    Engineers {
        #[command(subcommand)]
        action: EngineerCommand,
    },
    /// Administrator accounts
    Admins {
        #[command(subcommand)]
        action: AdminCommand,
    },
    /// Change a user's account state
    Users {
        #[command(subcommand)]
        action: UserCommand,
    },
    /// AI service health
    Health,
    /// Training documents
    Files {
        #[command(subcommand)]
        action: FileCommand,
    },
    /// Training runs
    Training {
        #[command(subcommand)]
        action: TrainingCommand,
    },
    /// Vector database maintenance
    Vectordb {
        #[command(subcommand)]
        action: VectorDbCommand,
    },
    /// Ask the assistant a question
    Chat {
        message: String,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
        /// Print the reply without layout
        #[arg(long)]
        raw: bool,
    },
    /// Search the knowledge base
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Follow-up questions for a message
    Suggest { message: String },
}

#[derive(Subcommand)]
pub enum EngineerCommand {
    /// List pending applications
    Pending,
    /// Approve an application
    Approve { id: String },
    /// Reject an application
    Reject {
        id: String,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
pub enum AdminCommand {
    List,
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    Activate { id: String },
    Suspend { id: String },
    Deactivate { id: String },
}

#[derive(Subcommand)]
pub enum FileCommand {
    List,
    /// Upload one or more documents (pdf, txt, md, doc, docx, csv, json)
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Delete documents; several ids are removed in one request
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show extracted text
    Preview { id: String },
}

#[derive(Subcommand)]
pub enum TrainingCommand {
    /// Start training over uploaded documents
    Start {
        #[arg(long)]
        name: String,
        /// Restrict to these file ids (default: every uploaded file)
        #[arg(long = "file")]
        files: Vec<String>,
        /// Follow the jobs until they finish
        #[arg(long)]
        watch: bool,
    },
    Jobs,
    /// Poll until every job is completed or failed
    Watch,
}

#[derive(Subcommand)]
pub enum VectorDbCommand {
    Status,
    /// Remove every object
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Delete one collection
    Drop {
        collection: String,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    api: ApiConfig,
    #[serde(default)]
    polling: PollingConfig,
}

/// Prints notices to stderr.
struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn notify(&self, notice: &Notice) {
        match notice.severity {
            Severity::Error => eprintln!("error: {}", notice),
            Severity::Warning => eprintln!("warning: {}", notice),
            Severity::Info | Severity::Success => eprintln!("{}", notice),
        }
    }
}

/// Marks a failure the sink has already shown.
#[derive(Debug)]
pub struct AlreadyReported;

impl std::fmt::Display for AlreadyReported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("failure already reported")
    }
}

impl std::error::Error for AlreadyReported {}

pub struct Ctx {
    pub client: Arc<ApiClient>,
    pub polling: PollingConfig,
    pub out: Output,
    pub sink: Arc<dyn NotificationSink>,
}

fn build_context(cli: &Cli) -> Result<Ctx> {
    let mut file = match &cli.config {
        Some(path) => common::config::load_file::<FileConfig>(path)?,
        None => FileConfig::default(),
    };
    file.api.apply_env();
    if let Some(url) = &cli.api_url {
        file.api.base_url = url.clone();
    }
    if let Some(token) = &cli.token {
        file.api.token = Some(token.clone());
    }

    let session = common::session::session_from_config(&file.api);
    if session.token().is_none() {
        log::warn!("No API token configured; protected endpoints will fail");
    }
    let client = ApiClient::new(&file.api, session).context("Failed to build HTTP client")?;
    log::debug!("Using API at {}", client.base_url());

    Ok(Ctx {
        client: Arc::new(client),
        polling: file.polling,
        out: Output::new(cli.format),
        sink: Arc::new(ConsoleSink),
    })
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = build_context(&cli)?;

    match cli.command {
        Commands::Stats => commands::stats(&ctx).await,
        Commands::Dashboard => commands::dashboard(&ctx).await,
        Commands::Engineers { action } => commands::engineers(&ctx, action).await,
        Commands::Admins { action } => commands::admins(&ctx, action).await,
        Commands::Users { action } => commands::users(&ctx, action).await,
        Commands::Health => commands::health(&ctx).await,
        Commands::Files { action } => commands::files(&ctx, action).await,
        Commands::Training { action } => commands::training(&ctx, action).await,
        Commands::Vectordb { action } => commands::vectordb(&ctx, action).await,
        Commands::Chat { message, conversation, raw } => {
            commands::chat(&ctx, message, conversation, raw).await
        }
        Commands::Search { query, limit } => commands::search(&ctx, &query, limit).await,
        Commands::Suggest { message } => commands::suggest(&ctx, &message).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli).await {
        if !e.is::<AlreadyReported>() {
            match e.downcast_ref::<ApiError>() {
                Some(api) => eprintln!("error: {} [{}]: {}", e, api.category(), api.user_message()),
                None => eprintln!("error: {:#}", e),
            }
        }
        std::process::exit(1);
    }
}
