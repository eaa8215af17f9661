use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use daybot::config::Config;
use daybot::engine::{self, Engine};
use daybot::error::Result;
use daybot::interfaces::sink::LogSink;

#[derive(Parser, Debug)]
#[command(name = "daybot")]
#[command(about = "Per-chat task reminder and daily digest scheduler")]
struct Cli {
    #[arg(long, default_value_t = daybot::runtime_paths::default_config_path())]
    config: String,

    /// Overrides the config file's data directory.
    #[arg(long)]
    data_dir: Option<String>,

    /// Overrides the config file's IANA timezone.
    #[arg(long)]
    timezone: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    daybot::logging::init_tracing("daybot");
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir;
    }
    if cli.timezone.is_some() {
        config.timezone = cli.timezone;
    }

    let data_dir = PathBuf::from(config.data_dir());
    let tz = config.timezone()?;
    tracing::info!(data_dir = %data_dir.display(), timezone = %tz, "starting scheduler");

    let engine = Engine::new(&data_dir, tz, Arc::new(LogSink));
    let chats = engine::discover_chats(&data_dir)?;
    engine.recover_all(&chats).await;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| daybot::error::DaybotError::Runtime(e.to_string()))?;
    engine.shutdown().await;
    Ok(())
}
