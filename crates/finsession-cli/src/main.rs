//! finsession - terminal frontend for the personal finance dashboard.
//!
//! Signs in against the finance backend, keeps the session alive with the
//! renewal prompt, and lists categories, transactions and statistics.

mod commands;
mod logging;
mod render;

use anyhow::Result;
use clap::Parser;
use finsession_core::{Config, EventSink, SessionController, StorageBackend, EVENT_CHANNEL_CAPACITY};
use tracing::{error, info};

use commands::Commands;

#[derive(Parser)]
#[command(name = "finsession")]
#[command(about = "Session and data access for the personal finance dashboard")]
#[command(version)]
struct Cli {
    /// API root, e.g. https://host/api/v1 (overrides config and FINSESSION_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Where to keep the session between runs
    #[arg(long, global = true, value_enum)]
    storage: Option<StorageArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum StorageArg {
    File,
    Keyring,
    Memory,
}

impl From<StorageArg> for StorageBackend {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::File => StorageBackend::File,
            StorageArg::Keyring => StorageBackend::Keyring,
            StorageArg::Memory => StorageBackend::Memory,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    config.apply_overrides(cli.api_url.clone(), None)?;
    if let Some(storage) = cli.storage {
        config.storage = storage.into();
    }

    let _log_guard = logging::init_tracing(&config)?;
    info!(api = %config.api_base_url, storage = %config.storage, "finsession starting");

    let (events, rx) = EventSink::channel(EVENT_CHANNEL_CAPACITY);
    let controller = SessionController::from_config(&config, events)?;

    if let Err(e) = cli.command.execute(&controller, &mut config, rx).await {
        error!("Command failed: {e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
