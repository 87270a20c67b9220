use std::fmt;

use conveyor_config::shared::EngineConfig;
use conveyor_config::{Config, SerializableSecretString};
use serde::Deserialize;

/// Complete configuration for the conveyor API service.
///
/// Contains the HTTP server settings, the embedded engine settings, and the
/// API keys accepted for bearer authentication.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Application server settings.
    pub application: ApplicationSettings,
    /// Settings for the embedded pipeline execution engine.
    #[serde(default)]
    pub engine: EngineConfig,
    /// List of API keys.
    ///
    /// All keys in this list are considered valid for authentication.
    pub api_keys: Vec<SerializableSecretString>,
}

impl Config for ApiConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["api_keys"];
}

/// HTTP server configuration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    /// Host address the API listens on.
    pub host: String,
    /// Port number the API listens on.
    pub port: u16,
}

impl fmt::Display for ApplicationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    host: {}", self.host)?;
        writeln!(f, "    port: {}", self.port)
    }
}
