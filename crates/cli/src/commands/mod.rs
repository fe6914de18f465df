pub mod config_cmd;
pub mod doctor;
pub mod invoke;
pub mod serve;

use std::path::{Path, PathBuf};

use foreman_agent::prompt::{install_base_instruction, load_prompt_file};
use foreman_config::{AppConfig, ConfigError};
use tracing::{info, warn};

/// The config file a command should read.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load, apply env overrides and validate.
pub fn read_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        None => AppConfig::load(),
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }
    }
}

/// Load configuration and install the configured base instruction.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = read_config(path).map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(prompt_file) = &config.agent.system_prompt_file {
        let text = load_prompt_file(prompt_file)
            .map_err(|e| format!("Failed to load {}: {e}", prompt_file.display()))?;
        if install_base_instruction(text) {
            info!(path = %prompt_file.display(), "Base instruction loaded");
        } else {
            warn!("Base instruction already initialized, ignoring system_prompt_file");
        }
    }

    Ok(config)
}
