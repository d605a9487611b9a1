//! HTTP clients: the submission backend and the session gateway.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DumperConfig;
use crate::error::{DumpError, DumpResult};
use crate::known::KnownDepotSource;
use crate::payload::CredentialPayload;

mod gateway;
mod http;

pub use gateway::{GatewayClient, Session};
use http::HttpBackend;

pub const USER_AGENT_VALUE: &str = concat!("tokendump/", env!("CARGO_PKG_VERSION"));

/// Response to a payload submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KnownDepotsResponse {
    depots: Vec<u32>,
}

/// Client for the aggregation backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: HttpBackend,
}

impl BackendClient {
    pub fn new(config: &DumperConfig) -> DumpResult<Self> {
        let http = HttpBackend::new(
            &config.backend_url,
            Duration::from_secs(config.http_timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { http })
    }

    /// Depot IDs the backend already has keys for.
    pub async fn known_depots(&self) -> DumpResult<Vec<u32>> {
        debug!(url = %self.http.url("KnownDepots"), "fetching known depots");
        let response: KnownDepotsResponse = self.http.get_json("KnownDepots").await?;
        Ok(response.depots)
    }

    /// Submit a payload. A response with `success: false` is an error.
    pub async fn submit(&self, payload: &CredentialPayload) -> DumpResult<SubmitResponse> {
        debug!(
            subs = payload.subs.len(),
            apps = payload.apps.len(),
            depots = payload.depots.len(),
            "submitting payload"
        );

        let response: SubmitResponse = self.http.post_json("SubmitTokens", payload).await?;

        if !response.success {
            return Err(DumpError::InvalidResponse {
                message: response
                    .message
                    .unwrap_or_else(|| "submission rejected".to_string()),
            });
        }

        info!(message = ?response.message, "payload submitted");
        Ok(response)
    }

    pub fn base_url(&self) -> &str {
        &self.http.base_url
    }
}

#[async_trait]
impl KnownDepotSource for BackendClient {
    async fn known_depot_ids(&self) -> DumpResult<Vec<u32>> {
        self.known_depots().await
    }
}
