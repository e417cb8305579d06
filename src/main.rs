use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use log::info;

use appwarden::{AdbDevice, ConfigStore, Database, OllamaClassifier, Warden};

const DEFAULT_DB_PATH: &str = "appwarden.db";
const DEFAULT_SETTINGS_PATH: &str = "appwarden-settings.json";
const DEFAULT_ADB_PATH: &str = "adb";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "gemma3:4b";
const CLASSIFY_TIMEOUT_SECS: u64 = 30;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let db_path = PathBuf::from(env_or("APPWARDEN_DB", DEFAULT_DB_PATH));
    let settings_path = PathBuf::from(env_or("APPWARDEN_SETTINGS", DEFAULT_SETTINGS_PATH));
    let adb_path = env_or("APPWARDEN_ADB", DEFAULT_ADB_PATH);
    let serial = env::var("APPWARDEN_SERIAL").ok();
    let ollama_url = env_or("APPWARDEN_OLLAMA", DEFAULT_OLLAMA_URL);
    let model = env_or("APPWARDEN_MODEL", DEFAULT_MODEL);

    let db = Database::new(db_path).context("database initialization failed")?;
    let config = ConfigStore::load(settings_path)?;
    let device = AdbDevice::new(adb_path, serial);
    let classifier = OllamaClassifier::new(
        ollama_url,
        model,
        Duration::from_secs(CLASSIFY_TIMEOUT_SECS),
    )?;

    let warden = Warden::new(db, config, device, classifier).await?;
    warden.start().await?;
    info!("enforcement started; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutdown signal received");
    warden.shutdown().await?;
    Ok(())
}
