use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mailora_sends::config::Config;
use mailora_sends::encryption::AppKeyEncrypter;
use mailora_sends::models::SentMessage;
use mailora_sends::services::{ModelRegistry, OutgoingMailRecorder};
use mailora_sends::{db, telemetry};

#[derive(Parser)]
#[command(name = "mailora-sends")]
#[command(about = "Record sent messages as Sends and link them to their models")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a Send for an RFC 5322 message file.
    Record {
        path: PathBuf,
        /// Transport message id; defaults to the Message-ID header.
        message_id: Option<String>,
    },
    /// Print a fresh `base64:` APP_KEY.
    Key,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    match cli.command {
        Command::Key => {
            println!("{}", AppKeyEncrypter::generate_key());
            Ok(())
        }
        Command::Record { path, message_id } => record(&path, message_id).await,
    }
}

async fn record(path: &Path, message_id: Option<String>) -> Result<()> {
    let config = Config::from_env()?;
    let encrypter = AppKeyEncrypter::from_app_key(&config.app_key).context("APP_KEY")?;
    let models = ModelRegistry::from_tables(&config.models)?;

    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool, &config.sends.tables).await?;

    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let message = SentMessage::from_raw(&raw, message_id)?;

    let recorder = OutgoingMailRecorder::new(pool, config.sends, Arc::new(encrypter), models);
    let recorded = recorder.handle(&message).await?;

    tracing::info!(
        send_id = recorded.send.id,
        attached = recorded.attached.len(),
        "send stored"
    );
    println!("{}", serde_json::to_string_pretty(&recorded.send)?);
    Ok(())
}
