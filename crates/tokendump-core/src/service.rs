//! Content service seam: the four remote operations the requester depends on.
//!
//! The protocol session lives behind this trait. [`crate::GatewayClient`]
//! implements it over HTTP; tests use in-memory fakes.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DumpResult;

/// Apps whose depots are shared redistributables and never worth a key request.
pub const EXCLUDED_DEPOT_SOURCE_APPS: [u32; 2] = [1007, 228980];

/// One license held by the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    #[serde(rename = "packageid")]
    pub package_id: u32,
    #[serde(rename = "access_token", default)]
    pub access_token: u64,
    #[serde(default)]
    pub flags: u32,
}

/// Package metadata: the apps a package grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(rename = "packageid")]
    pub package_id: u32,
    #[serde(rename = "appids", default)]
    pub app_ids: Vec<u32>,
}

/// Authenticated app metadata request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRequest {
    #[serde(rename = "appid")]
    pub app_id: u32,
    #[serde(rename = "access_token", default)]
    pub access_token: u64,
}

/// App metadata: the depots an app declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    #[serde(rename = "appid")]
    pub app_id: u32,
    #[serde(default)]
    pub depots: Vec<DepotDeclaration>,
}

/// A depot entry under an app's `depots` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotDeclaration {
    /// Section name; normally the depot ID.
    pub name: String,
    #[serde(rename = "depotfromapp", default)]
    pub depot_from_app: Option<u32>,
}

impl DepotDeclaration {
    pub fn depot_id(&self) -> Option<u32> {
        self.name.parse().ok()
    }

    /// Whether the depot is borrowed from a redistributable app.
    pub fn is_redistributable(&self) -> bool {
        self.depot_from_app
            .is_some_and(|app| EXCLUDED_DEPOT_SOURCE_APPS.contains(&app))
    }
}

/// Result of an access token request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrants {
    /// App ID → token. A zero token means the app is readable without one.
    #[serde(default)]
    pub granted: HashMap<u32, u64>,
    #[serde(default)]
    pub denied: Vec<u32>,
}

/// Result of a depot decryption key request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotKey {
    #[serde(rename = "depotid")]
    pub depot_id: u32,
    #[serde(rename = "appid")]
    pub app_id: u32,
    pub result: ResultCode,
    #[serde(with = "hex::serde", default)]
    pub key: Vec<u8>,
}

/// Remote result code, as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCode(pub u32);

impl ResultCode {
    pub const OK: Self = Self(1);
    pub const FAIL: Self = Self(2);
    pub const INVALID_PARAM: Self = Self(8);
    pub const FILE_NOT_FOUND: Self = Self(9);
    pub const ACCESS_DENIED: Self = Self(15);
    pub const TIMEOUT: Self = Self(16);
    pub const BLOCKED: Self = Self(40);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::OK => "OK",
            Self::FAIL => "Fail",
            Self::INVALID_PARAM => "InvalidParam",
            Self::FILE_NOT_FOUND => "FileNotFound",
            Self::ACCESS_DENIED => "AccessDenied",
            Self::TIMEOUT => "Timeout",
            Self::BLOCKED => "Blocked",
            _ => return None,
        })
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Result({})", self.0),
        }
    }
}

/// Remote metadata, token and key operations.
///
/// An `Err` from any method is a transport or protocol failure. A depot key
/// request the service answered but refused is an `Ok` carrying a non-OK
/// [`ResultCode`].
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Metadata for a batch of packages.
    async fn package_info(&self, package_ids: &[u32]) -> DumpResult<Vec<PackageInfo>>;

    /// Metadata for a batch of apps, authenticated with their tokens.
    async fn app_info(&self, requests: &[AppRequest]) -> DumpResult<Vec<AppInfo>>;

    /// Access tokens for a batch of apps.
    async fn access_tokens(&self, app_ids: &[u32]) -> DumpResult<TokenGrants>;

    /// Decryption key for `depot_id`, requested on behalf of `app_id`.
    async fn depot_decryption_key(&self, depot_id: u32, app_id: u32) -> DumpResult<DepotKey>;
}
