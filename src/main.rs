use std::fs;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use scenesync::channel::MemoryChannel;
use scenesync::config::SyncConfig;
use scenesync::error::ErrorCode;
use scenesync::services::agent::{AgentAction, AgentError, apply_actions};
use scenesync::services::sync::{SyncError, SyncHub};
use scenesync::store::{MemoryStore, ObjectStore, PgObjectStore, StoreError};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("database init failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("action {index} failed: {source}")]
    Action { index: usize, source: AgentError },
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl ErrorCode for CliError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "E_DATABASE",
            Self::Store(e) => e.error_code(),
            Self::Sync(e) => e.error_code(),
            Self::Action { source, .. } => source.error_code(),
            Self::Io(_) => "E_IO",
            Self::InvalidJson(_) => "E_INVALID_JSON",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "scenesync", about = "Inspect and edit a shared canvas")]
struct Cli {
    /// Postgres URL. Without it objects live in memory for this run only.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "SCENESYNC_CANVAS_ID")]
    canvas_id: Uuid,

    /// Acting user; a random id when unset.
    #[arg(long, env = "SCENESYNC_USER_ID")]
    user_id: Option<Uuid>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every object on the canvas as JSON.
    List,
    /// Apply a JSON array of agent actions.
    Apply {
        #[arg(long, default_value = "-", help = "Input file path, or - for stdin")]
        input: String,
    },
    /// Print the object count whenever the canvas changes.
    Watch {
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "no .env file loaded");
    }

    let cli = Cli::parse();
    let store = open_store(cli.database_url.as_deref()).await?;
    let config = SyncConfig::from_env();
    let channel = Arc::new(MemoryChannel::new(config.channel_capacity));
    let user_id = cli.user_id.unwrap_or_else(Uuid::new_v4);
    let hub = SyncHub::new(cli.canvas_id, user_id, store, channel, config);

    let result = match cli.command {
        Command::List => run_list(&hub).await,
        Command::Apply { input } => run_apply(&hub, &input).await,
        Command::Watch { seconds } => run_watch(&hub, Duration::from_secs(seconds)).await,
    };
    if let Err(ref e) = result {
        tracing::error!(code = e.error_code(), error = %e, "command failed");
    }
    result
}

async fn open_store(database_url: Option<&str>) -> Result<Arc<dyn ObjectStore>, CliError> {
    match database_url {
        Some(url) => {
            let pool = scenesync::db::init_pool(url).await?;
            Ok(Arc::new(PgObjectStore::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using an in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn run_list(hub: &SyncHub) -> Result<(), CliError> {
    let session = hub.connect().await?;
    println!("{}", serde_json::to_string_pretty(&hub.objects())?);
    session.close();
    Ok(())
}

async fn run_apply(hub: &SyncHub, input: &str) -> Result<(), CliError> {
    let raw = if input == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(input)?
    };
    let actions: Vec<AgentAction> = serde_json::from_str(&raw)?;

    let session = hub.connect().await?;
    let report = apply_actions(hub, &actions).await;
    session.close();

    eprintln!("applied {}/{} actions", report.applied(), actions.len());
    match report.failure {
        Some((index, source)) => Err(CliError::Action { index, source }),
        None => Ok(()),
    }
}

async fn run_watch(hub: &SyncHub, duration: Duration) -> Result<(), CliError> {
    let session = hub.connect().await?;
    let deadline = tokio::time::Instant::now() + duration;
    let mut last = usize::MAX;
    while tokio::time::Instant::now() < deadline {
        let count = hub.objects().len();
        if count != last {
            println!("{count} objects");
            last = count;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    session.close();
    Ok(())
}
