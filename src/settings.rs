//! Layered configuration and logging setup.
//!
//! Settings come from an optional TOML file overlaid by `QUARRY_`
//! environment variables, e.g. `QUARRY_TEMPLATE__CONSISTENT_QUOTES=true`.

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::{QuarryError, Result};

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub query: QuerySettings,
    pub template: TemplateSettings,
    pub log: LogSettings,
}

/// Capability profile requested for query engines.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuerySettings {
    pub flags: bool,
    pub features: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self { flags: true, features: true }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TemplateSettings {
    pub custom_fields: bool,
    pub custom_directives: bool,
    pub consistent_quotes: bool,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            custom_fields: true,
            custom_directives: false,
            consistent_quotes: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { filter: String::from("info") }
    }
}

impl Settings {
    /// Reads `path` (any extension `config` understands, missing is fine)
    /// and then the environment.
    pub fn load(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(environment())
            .build()?;
        Ok(config.try_deserialize()?)
    }
    /// Parses TOML text without consulting the environment.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

fn environment() -> Environment {
    Environment::with_prefix("QUARRY")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Installs a global fmt subscriber filtered by `settings.filter`.
/// Returns false when a subscriber was already installed.
pub fn init_tracing(settings: &LogSettings) -> Result<bool> {
    let filter = EnvFilter::try_new(&settings.filter)
        .map_err(|e| QuarryError::Config(format!("invalid log filter '{}': {}", settings.filter, e)))?;
    Ok(tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok())
}
