//! Run configuration.
//!
//! Loaded from a YAML file (all fields optional), then overridden by
//! `TOKENDUMP_*` environment variables.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{DumpError, DumpResult};
use crate::io::default_data_dir;

/// Configuration for a dump run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumperConfig {
    /// Base URL of the submission backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Base URL of the session gateway.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Per-call timeout for content service calls, in seconds.
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,

    /// Backend request timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Maximum retries for transient backend failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// IDs per content service batch.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: NonZeroUsize,

    /// Skip key requests for depots that were sent before or the backend knows.
    #[serde(default = "default_true")]
    pub skip_known_depots: bool,

    /// Apps that are never requested.
    #[serde(default)]
    pub skip_app_ids: Vec<u32>,

    /// Known-depot cache file.
    #[serde(default = "default_known_depots_path")]
    pub known_depots_path: PathBuf,

    /// Write a sorted JSON snapshot of the payload here before submitting.
    #[serde(default)]
    pub dump_path: Option<PathBuf>,

    /// Submit the payload to the backend.
    #[serde(default = "default_true")]
    pub submit: bool,
}

fn default_backend_url() -> String {
    "https://tokendumper.steamdb.info/api".to_string()
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:27060".to_string()
}

fn default_rpc_timeout() -> u64 {
    60
}

fn default_http_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_chunk_size() -> NonZeroUsize {
    NonZeroUsize::new(200).unwrap_or(NonZeroUsize::MIN)
}

fn default_true() -> bool {
    true
}

fn default_known_depots_path() -> PathBuf {
    default_data_dir()
        .unwrap_or_else(|_| PathBuf::from(".tokendump"))
        .join("known_depots.txt")
}

impl Default for DumperConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            gateway_url: default_gateway_url(),
            rpc_timeout_secs: default_rpc_timeout(),
            http_timeout_secs: default_http_timeout(),
            max_retries: default_max_retries(),
            chunk_size: default_chunk_size(),
            skip_known_depots: true,
            skip_app_ids: Vec::new(),
            known_depots_path: default_known_depots_path(),
            dump_path: None,
            submit: true,
        }
    }
}

impl DumperConfig {
    /// Create config from defaults and environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a YAML config file, then apply environment overrides.
    pub async fn load(path: impl AsRef<Path>) -> DumpResult<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| DumpError::Config {
                message: format!("failed to read {}: {}", path.display(), e),
            })?;

        let mut config = Self::parse(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML content. An empty document yields the defaults.
    pub fn parse(content: &str) -> DumpResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(content).map_err(|e| DumpError::Config {
            message: format!("failed to parse config: {}", e),
        })
    }

    /// Override fields from `TOKENDUMP_*` variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `TOKENDUMP_BACKEND_URL` | `backend_url` |
    /// | `TOKENDUMP_GATEWAY_URL` | `gateway_url` |
    /// | `TOKENDUMP_RPC_TIMEOUT` | `rpc_timeout_secs` |
    /// | `TOKENDUMP_HTTP_TIMEOUT` | `http_timeout_secs` |
    /// | `TOKENDUMP_MAX_RETRIES` | `max_retries` |
    /// | `TOKENDUMP_SKIP_KNOWN_DEPOTS` | `skip_known_depots` |
    /// | `TOKENDUMP_KNOWN_DEPOTS` | `known_depots_path` |
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("TOKENDUMP_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Ok(url) = std::env::var("TOKENDUMP_GATEWAY_URL") {
            self.gateway_url = url;
        }
        if let Some(secs) = env_parse("TOKENDUMP_RPC_TIMEOUT") {
            self.rpc_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("TOKENDUMP_HTTP_TIMEOUT") {
            self.http_timeout_secs = secs;
        }
        if let Some(retries) = env_parse("TOKENDUMP_MAX_RETRIES") {
            self.max_retries = retries;
        }
        if let Ok(v) = std::env::var("TOKENDUMP_SKIP_KNOWN_DEPOTS") {
            self.skip_known_depots = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(path) = std::env::var("TOKENDUMP_KNOWN_DEPOTS") {
            self.known_depots_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> DumpResult<()> {
        if self.backend_url.trim().is_empty() {
            return Err(DumpError::Config {
                message: "backend_url must not be empty".to_string(),
            });
        }
        if self.gateway_url.trim().is_empty() {
            return Err(DumpError::Config {
                message: "gateway_url must not be empty".to_string(),
            });
        }
        if self.rpc_timeout_secs == 0 {
            return Err(DumpError::Config {
                message: "rpc_timeout_secs must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Set the backend URL.
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }

    /// Set the gateway URL.
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    /// Set the known-depot cache path.
    pub fn with_known_depots_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_depots_path = path.into();
        self
    }

    pub fn with_skip_known_depots(mut self, skip: bool) -> Self {
        self.skip_known_depots = skip;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
