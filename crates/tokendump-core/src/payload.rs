//! Credential payload collected during a run.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DumpError, DumpResult};
use crate::io::write_atomic;

/// Payload schema version understood by the backend.
pub const PAYLOAD_VERSION: u32 = 2;

/// Tokens and depot keys collected for one account.
///
/// Map keys are entity IDs; they serialize as decimal strings. Values are
/// decimal token strings (`subs`, `apps`) or uppercase hex keys (`depots`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialPayload {
    /// Schema version.
    #[serde(rename = "v")]
    pub version: u32,

    /// Account the credentials belong to, set right before submission.
    #[serde(rename = "steamid", default, skip_serializing_if = "Option::is_none")]
    pub steam_id: Option<String>,

    /// Package ID → access token.
    pub subs: HashMap<u32, String>,

    /// App ID → access token.
    pub apps: HashMap<u32, String>,

    /// Depot ID → decryption key.
    pub depots: HashMap<u32, String>,
}

impl CredentialPayload {
    pub fn new() -> Self {
        Self {
            version: PAYLOAD_VERSION,
            ..Default::default()
        }
    }

    /// Record a package token. Zero tokens are refused.
    pub fn insert_sub(&mut self, package_id: u32, token: u64) -> bool {
        if token == 0 {
            return false;
        }
        self.subs.insert(package_id, token.to_string());
        true
    }

    /// Record an app token. Zero tokens are refused.
    pub fn insert_app(&mut self, app_id: u32, token: u64) -> bool {
        if token == 0 {
            return false;
        }
        self.apps.insert(app_id, token.to_string());
        true
    }

    /// Record a depot decryption key. Empty keys are refused.
    pub fn insert_depot_key(&mut self, depot_id: u32, key: &[u8]) -> bool {
        if key.is_empty() {
            return false;
        }
        self.depots.insert(depot_id, hex::encode_upper(key));
        true
    }

    pub fn with_steam_id(mut self, steam_id: u64) -> Self {
        self.steam_id = Some(steam_id.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty() && self.apps.is_empty() && self.depots.is_empty()
    }

    /// Sorted, read-only copy for display and local dumps.
    pub fn snapshot(&self) -> PayloadSnapshot {
        fn sorted(map: &HashMap<u32, String>) -> BTreeMap<u32, String> {
            map.iter().map(|(k, v)| (*k, v.clone())).collect()
        }

        PayloadSnapshot {
            generated_at: Utc::now(),
            subs: sorted(&self.subs),
            apps: sorted(&self.apps),
            depots: sorted(&self.depots),
        }
    }
}

/// Key-sorted view of a [`CredentialPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSnapshot {
    pub generated_at: DateTime<Utc>,
    pub subs: BTreeMap<u32, String>,
    pub apps: BTreeMap<u32, String>,
    pub depots: BTreeMap<u32, String>,
}

impl PayloadSnapshot {
    pub fn to_json(&self) -> DumpResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| DumpError::Dump {
            message: format!("failed to serialize payload: {}", e),
        })
    }

    /// Write the snapshot as pretty JSON, replacing any existing file.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> DumpResult<()> {
        let path = path.as_ref();
        let json = self.to_json()?;

        write_atomic(path, &json)
            .await
            .map_err(|e| DumpError::Dump {
                message: format!("failed to write {}: {}", path.display(), e),
            })?;

        info!(
            path = %path.display(),
            subs = self.subs.len(),
            apps = self.apps.len(),
            depots = self.depots.len(),
            "wrote payload dump"
        );
        Ok(())
    }
}
