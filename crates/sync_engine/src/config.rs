use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_CONFIG_FILE: &str = "diagram.toml";
const ENV_PREFIX: &str = "DIAGRAM";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    pub debounce_ms: u64,
    pub initial_timeout_ms: u64,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            initial_timeout_ms: 2000,
        }
    }
}

impl MeasurementConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Adds the logger middleware around every transaction.
    pub debug_mode: bool,
    pub measurement: MeasurementConfig,
}

impl EngineConfig {
    /// Layers defaults, then the optional TOML file (`diagram.toml` when no
    /// path is given), then `DIAGRAM__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        load_layered(&path, ENV_PREFIX)
    }
}

fn load_layered(path: &Path, env_prefix: &str) -> Result<EngineConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()).required(false))
        .add_source(
            config::Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
