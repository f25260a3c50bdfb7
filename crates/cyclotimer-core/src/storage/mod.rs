mod config;

pub use config::{Config, CONFIG_FILE};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/cyclotimer[-dev]/` based on CYCLOTIMER_ENV.
///
/// Set CYCLOTIMER_ENV=dev to use the development directory, or
/// CYCLOTIMER_CONFIG_DIR to use an explicit directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("CYCLOTIMER_CONFIG_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("CYCLOTIMER_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("cyclotimer-dev")
            } else {
                base_dir.join("cyclotimer")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DirUnavailable(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
