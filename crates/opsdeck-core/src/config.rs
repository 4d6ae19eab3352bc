//! Client configuration.
//!
//! Loaded from TOML, e.g. `~/.config/opsdeck/config.toml`:
//!
//! ```toml
//! base_url = "https://ops.example.com/api/v1"
//! reconcile_interval_ms = 100
//! close_timeout_ms = 1000
//! compact_cols = 80
//!
//! [terminal]
//! cols = 80
//! rows = 24
//! ```

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::endpoint::{Endpoint, EndpointError};

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

/// Client tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root, e.g. `http://localhost:8000/api/v1`.
    pub base_url: String,
    /// How often task output is reconciled into the public buffer.
    pub reconcile_interval_ms: u64,
    /// How long a local close waits for the close frame to go out.
    pub close_timeout_ms: u64,
    /// Viewports narrower than this many columns are compact.
    pub compact_cols: u16,
    /// Initial terminal size.
    pub terminal: TerminalConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            reconcile_interval_ms: 100,
            close_timeout_ms: 1000,
            compact_cols: 80,
            terminal: TerminalConfig::default(),
        }
    }
}

/// Initial terminal size, used when the local size is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl ClientConfig {
    /// Parse from a TOML string.
    ///
    /// # Errors
    /// Returns error if the TOML is invalid.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), base_url = %config.base_url, "loaded config");
        Ok(config)
    }

    /// Parse `base_url` into an endpoint.
    ///
    /// # Errors
    /// Returns error if the base URL is invalid.
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        Ok(Endpoint::parse(&self.base_url)?)
    }

    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        // A zero period would make the reconcile timer panic.
        let ms = if self.reconcile_interval_ms == 0 {
            1
        } else {
            self.reconcile_interval_ms
        };
        Duration::from_millis(ms)
    }

    #[must_use]
    pub const fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}
