//! Server configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML file
//! (`agenda.toml`, or the path in `AGENDA_CONFIG`), then `AGENDA_*` environment
//! variables, then a bare `PORT`.

use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

static DEFAULT_CONFIG_FILE: &str = "agenda.toml";
static DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_OCCURRENCE_LIMIT: usize = 10;
static DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    /// Maximum occurrences returned by `/api/next-occurrences`
    pub occurrence_limit: usize,

    /// `tracing` filter directive, used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            occurrence_limit: DEFAULT_OCCURRENCE_LIMIT,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn config_path() -> PathBuf {
        std::env::var("AGENDA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::builder(Self::config_path())?.build()?.try_deserialize()
    }

    fn builder(
        path: PathBuf,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Self::layered(
            path,
            Environment::with_prefix("AGENDA"),
            std::env::var("PORT").ok(),
        )
    }

    fn layered(
        path: PathBuf,
        env: Environment,
        port: Option<String>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = ServerConfig::default();

        Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("occurrence_limit", defaults.occurrence_limit as i64)?
            .set_default("log_filter", defaults.log_filter)?
            .add_source(File::from(path).required(false))
            .add_source(env)
            .set_override_option("port", port)
    }
}
