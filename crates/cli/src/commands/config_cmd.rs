//! `ragline config`: Configuration management commands.

use std::path::{Path, PathBuf};
use clap::Subcommand;
use ragline_config::AppConfig;

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Print the config file location
    Path,
    /// Write a default config file if none exists
    Init,
}

pub async fn run(action: Option<ConfigAction>) -> Result<(), Box<dyn std::error::Error>> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => show(),
        ConfigAction::Path => {
            println!("{}", config_path().display());
            Ok(())
        }
        ConfigAction::Init => init(&config_path()),
    }
}

fn config_path() -> PathBuf {
    std::env::var("RAGLINE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| AppConfig::config_dir().join("config.toml"))
}

fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", config.redacted_toml());
    Ok(())
}

fn init(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
