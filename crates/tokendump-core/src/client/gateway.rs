//! Gateway client: the content service behind a local HTTP bridge that owns
//! the logged-in session.
//!
//! The gateway never retries. A failed call is reported to the requester as-is.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::DumperConfig;
use crate::error::DumpResult;
use crate::service::{
    AppInfo, AppRequest, ContentService, DepotKey, License, PackageInfo, TokenGrants,
};

use super::http::HttpBackend;

/// The logged-in account and its licenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "steamid")]
    pub steam_id: u64,
    #[serde(default)]
    pub licenses: Vec<License>,
}

#[derive(Debug, Deserialize)]
struct PackagesResponse {
    #[serde(default)]
    packages: Vec<PackageInfo>,
}

#[derive(Debug, Deserialize)]
struct AppsResponse {
    #[serde(default)]
    apps: Vec<AppInfo>,
}

/// [`ContentService`] over the session gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: HttpBackend,
}

impl GatewayClient {
    pub fn new(config: &DumperConfig) -> DumpResult<Self> {
        // The requester enforces the per-call timeout; this only bounds stuck sockets.
        let http = HttpBackend::new(&config.gateway_url, config.rpc_timeout() * 2, 0)?;
        Ok(Self { http })
    }

    pub async fn session(&self) -> DumpResult<Session> {
        let session: Session = self.http.get_json("session").await?;
        debug!(licenses = session.licenses.len(), "fetched session");
        Ok(session)
    }
}

#[async_trait]
impl ContentService for GatewayClient {
    async fn package_info(&self, package_ids: &[u32]) -> DumpResult<Vec<PackageInfo>> {
        let response: PackagesResponse = self
            .http
            .post_json("packageinfo", &json!({ "packageids": package_ids }))
            .await?;
        Ok(response.packages)
    }

    async fn app_info(&self, requests: &[AppRequest]) -> DumpResult<Vec<AppInfo>> {
        let response: AppsResponse = self
            .http
            .post_json("appinfo", &json!({ "apps": requests }))
            .await?;
        Ok(response.apps)
    }

    async fn access_tokens(&self, app_ids: &[u32]) -> DumpResult<TokenGrants> {
        self.http
            .post_json("tokens", &json!({ "appids": app_ids }))
            .await
    }

    async fn depot_decryption_key(&self, depot_id: u32, app_id: u32) -> DumpResult<DepotKey> {
        self.http
            .post_json("depotkey", &json!({ "depotid": depot_id, "appid": app_id }))
            .await
    }
}
