//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use treeql_core::{Error, Result};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub host: String,

    /// HTTP port
    pub port: u16,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Schema and row fixture loaded at startup
    pub fixture: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7878,
            log_level: "info".to_string(),
            fixture: None,
        }
    }
}

impl ServerConfig {
    /// Create a configuration serving the given fixture
    pub fn new<P: Into<PathBuf>>(fixture: P) -> Self {
        Self {
            fixture: Some(fixture.into()),
            ..Default::default()
        }
    }

    /// Create configuration for development
    pub fn for_development<P: Into<PathBuf>>(fixture: P) -> Self {
        Self {
            log_level: "debug".to_string(),
            ..Self::new(fixture)
        }
    }

    /// Load a configuration from a JSON file; missing keys take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            Error::Configuration(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Builder: set listen address
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Builder: set HTTP port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder: set log level
    pub fn log_level(mut self, level: &str) -> Self {
        self.log_level = level.to_string();
        self
    }

    /// Builder: set fixture path
    pub fn fixture<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.fixture = Some(path.into());
        self
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
