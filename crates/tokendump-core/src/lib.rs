//! Batched token and depot key collection.
//!
//! This crate turns an account's license list into a credential payload and
//! submits it to the aggregation backend:
//!
//! - Order-preserving chunking of large ID sets
//! - Four-stage requester (licenses → owned apps → app tokens → depot keys)
//! - Persisted known-depot cache combined with the backend's skip list
//! - HTTP clients for the submission backend and the session gateway
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokendump_core::{BackendClient, DumperConfig, GatewayClient, KnownDepots, Requester};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = DumperConfig::from_env();
//! let backend = BackendClient::new(&config)?;
//! let gateway = GatewayClient::new(&config)?;
//!
//! let mut known = KnownDepots::new();
//! known.load(&config.known_depots_path).await?;
//! known.fetch_server_skip_list(&backend).await?;
//!
//! let session = gateway.session().await?;
//! let requester = Requester::new(Arc::new(gateway), &config);
//! let run = requester.process_license_list(&session.licenses, &known).await;
//! println!("collected {} depot keys", run.payload.depots.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `TOKENDUMP_BACKEND_URL` | Submission backend base URL |
//! | `TOKENDUMP_GATEWAY_URL` | Session gateway base URL |
//! | `TOKENDUMP_RPC_TIMEOUT` | Per-call RPC timeout in seconds (default: 60) |
//! | `TOKENDUMP_HTTP_TIMEOUT` | Backend request timeout in seconds (default: 30) |
//! | `TOKENDUMP_MAX_RETRIES` | Max retries for transient backend failures (default: 3) |
//! | `TOKENDUMP_SKIP_KNOWN_DEPOTS` | Skip key requests for already known depots |
//! | `TOKENDUMP_KNOWN_DEPOTS` | Path of the known-depot cache file |

pub mod chunk;
pub mod client;
pub mod config;
pub mod error;
mod io;
pub mod known;
pub mod payload;
pub mod progress;
pub mod requester;
pub mod service;

pub use chunk::{chunked, Chunks, TailPolicy};
pub use client::{BackendClient, GatewayClient, Session, SubmitResponse, USER_AGENT_VALUE};
pub use config::DumperConfig;
pub use error::{DumpError, DumpResult};
pub use known::{KnownDepotSource, KnownDepots};
pub use payload::{CredentialPayload, PayloadSnapshot, PAYLOAD_VERSION};
pub use progress::{ProgressEvent, ProgressSink};
pub use requester::{PipelineRun, Requester, RunReport, RunStatus, Stage};
pub use service::{
    AppInfo, AppRequest, ContentService, DepotDeclaration, DepotKey, License, PackageInfo,
    ResultCode, TokenGrants,
};
