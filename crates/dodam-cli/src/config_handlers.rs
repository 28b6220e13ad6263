//! Handler functions for `config` subcommands.

use anyhow::{Context, Result, bail};
use dodam_core::RealtimeConfig;
use std::path::{Path, PathBuf};

use crate::cli::ConfigAction;

/// Dispatches a config subcommand.
pub fn handle_config_command(config_path: Option<&Path>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = RealtimeConfig::load(config_path)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        ConfigAction::Path => cmd_config_path(config_path),
        ConfigAction::Init { force } => {
            let path = cmd_config_init(config_path, force)?;
            println!("Config file created at {}", path.display());
            Ok(())
        }
    }
}

/// Shows the resolved config file path.
pub fn cmd_config_path(config_path: Option<&Path>) -> Result<()> {
    let Some(path) = RealtimeConfig::resolve_config_path(config_path) else {
        bail!("Could not determine config directory for this platform");
    };
    println!("{}", path.display());
    if !path.exists() {
        eprintln!("(file does not exist; run `dodam-chat config init` to create it)");
    }
    Ok(())
}

/// Writes the default configuration and returns where it went.
pub fn cmd_config_init(config_path: Option<&Path>, force: bool) -> Result<PathBuf> {
    let Some(path) = RealtimeConfig::resolve_config_path(config_path) else {
        bail!("Could not determine config directory");
    };

    if path.exists() && !force {
        bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let toml_str = RealtimeConfig::default().to_toml_string()?;
    std::fs::write(&path, toml_str)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
