//! Configuration loading from file system

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::defaults::DEFAULT_CONFIG_PATH;
use super::types::Config;

/// Default config file location with `~` expanded.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde(DEFAULT_CONFIG_PATH).as_ref())
}

/// Load configuration from a JSON file.
///
/// Returns Config::default() if the file is missing or cannot be parsed.
#[instrument(name = "load_config", skip_all, fields(path = %path.display()))]
pub fn load_config(path: &Path) -> Config {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Config file not found, using defaults");
            return Config::default();
        }
        Err(e) => {
            warn!(error = %e, "Failed to read config file, using defaults");
            return Config::default();
        }
    };

    match serde_json::from_str::<Config>(&contents) {
        Ok(config) => {
            info!("Successfully loaded config");
            config
        }
        Err(e) => {
            let hint = if e.to_string().contains("invalid type") {
                "\n\nHint: durations are plain numbers, e.g. {\"timeoutSecs\": 600}, \
                 and uiCommand is an object: {\"uiCommand\": {\"program\": \"my-ui\", \"args\": []}}"
            } else {
                ""
            };
            warn!(
                error = %e,
                hint = %hint,
                "Failed to parse config JSON, using defaults"
            );
            Config::default()
        }
    }
}
