//! Four-stage requester: licenses → owned apps → app tokens → depot keys.
//!
//! Stages run strictly in order and every stage walks its input in chunks,
//! one chunk at a time. The only fan-out is inside a depot key chunk, where
//! all key calls are spawned onto a `JoinSet` and joined before the next
//! chunk starts.
//!
//! A failing package info, token or app info call ends the run. The caller
//! still gets everything collected up to that point (see [`PipelineRun`]).
//! Individual depot key failures only show up in the result histogram.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::chunk::chunked;
use crate::config::DumperConfig;
use crate::error::{DumpError, DumpResult};
use crate::known::KnownDepots;
use crate::payload::CredentialPayload;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::service::{AppRequest, ContentService, DepotKey, License, ResultCode};

/// Pipeline stage, used to report where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Licenses,
    OwnedApps,
    Tokens,
    DepotKeys,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Licenses => "licenses",
            Self::OwnedApps => "owned apps",
            Self::Tokens => "app tokens",
            Self::DepotKeys => "depot keys",
        })
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunStatus {
    Completed,
    Aborted { stage: Stage, error: DumpError },
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub licenses: usize,
    pub license_tokens: usize,
    pub owned_apps: usize,
    pub skipped_apps: usize,
    pub tokens_granted: usize,
    pub tokens_denied: usize,
    pub tokens_nonzero: usize,
    pub key_requests: usize,
    pub skipped_known: usize,
    /// Depots skipped because an earlier chunk already returned their key.
    pub already_keyed: usize,
    pub redistributable: usize,
    pub unparsable: usize,
    /// Depot key result code → number of calls.
    pub results: BTreeMap<ResultCode, usize>,
}

impl RunReport {
    /// `OK=3, AccessDenied=1` style summary of the result histogram.
    pub fn result_summary(&self) -> String {
        self.results
            .iter()
            .map(|(code, count)| format!("{}={}", code, count))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Outcome of [`Requester::process_license_list`].
#[derive(Debug)]
pub struct PipelineRun {
    pub payload: CredentialPayload,
    pub report: RunReport,
    pub status: RunStatus,
}

impl PipelineRun {
    pub fn is_complete(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }
}

/// Drives the four stages against a [`ContentService`].
#[derive(Clone)]
pub struct Requester {
    service: Arc<dyn ContentService>,
    timeout: Duration,
    chunk_size: NonZeroUsize,
    skip_known_depots: bool,
    skip_app_ids: HashSet<u32>,
    progress: Option<ProgressSink>,
}

impl fmt::Debug for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requester")
            .field("timeout", &self.timeout)
            .field("chunk_size", &self.chunk_size)
            .field("skip_known_depots", &self.skip_known_depots)
            .field("skip_app_ids", &self.skip_app_ids.len())
            .finish_non_exhaustive()
    }
}

impl Requester {
    pub fn new(service: Arc<dyn ContentService>, config: &DumperConfig) -> Self {
        Self {
            service,
            timeout: config.rpc_timeout(),
            chunk_size: config.chunk_size,
            skip_known_depots: config.skip_known_depots,
            skip_app_ids: config.skip_app_ids.iter().copied().collect(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run all stages for `licenses`.
    ///
    /// Never fails: a stage error is returned as [`RunStatus::Aborted`]
    /// alongside the partial payload.
    pub async fn process_license_list(
        &self,
        licenses: &[License],
        known: &KnownDepots,
    ) -> PipelineRun {
        let mut payload = CredentialPayload::new();
        let mut report = RunReport::default();

        let status = match self
            .run_stages(licenses, known, &mut payload, &mut report)
            .await
        {
            Ok(()) => {
                info!(
                    subs = payload.subs.len(),
                    apps = payload.apps.len(),
                    depots = payload.depots.len(),
                    results = %report.result_summary(),
                    "token collection finished"
                );
                RunStatus::Completed
            }
            Err((stage, error)) => {
                error!(
                    stage = %stage,
                    error = %error,
                    subs = payload.subs.len(),
                    apps = payload.apps.len(),
                    depots = payload.depots.len(),
                    "token collection aborted"
                );
                RunStatus::Aborted { stage, error }
            }
        };

        PipelineRun {
            payload,
            report,
            status,
        }
    }

    async fn run_stages(
        &self,
        licenses: &[License],
        known: &KnownDepots,
        payload: &mut CredentialPayload,
        report: &mut RunReport,
    ) -> Result<(), (Stage, DumpError)> {
        let package_ids = ingest_licenses(licenses, payload, report);

        let owned = self
            .discover_owned_apps(&package_ids, report)
            .await
            .map_err(|e| (Stage::OwnedApps, e))?;

        let requests = self
            .request_tokens(&owned, payload, report)
            .await
            .map_err(|e| (Stage::Tokens, e))?;

        self.request_depot_keys(&requests, known, payload, report)
            .await
            .map_err(|e| (Stage::DepotKeys, e))
    }

    async fn discover_owned_apps(
        &self,
        package_ids: &BTreeSet<u32>,
        report: &mut RunReport,
    ) -> DumpResult<BTreeSet<u32>> {
        let mut owned = BTreeSet::new();
        let chunks = package_ids.len().div_ceil(self.chunk_size.get());

        for (index, chunk) in chunked(package_ids.iter().copied(), self.chunk_size).enumerate() {
            let infos = self
                .call("package info", self.service.package_info(&chunk))
                .await?;

            if infos.is_empty() {
                debug!(chunk = index + 1, "package info returned no records");
            }
            for info in infos {
                owned.extend(info.app_ids);
            }

            self.emit(ProgressEvent::OwnedApps {
                chunk: index + 1,
                chunks,
                owned: owned.len(),
            });
        }

        let before = owned.len();
        owned.retain(|app_id| !self.skip_app_ids.contains(app_id));
        report.owned_apps = owned.len();
        report.skipped_apps = before - owned.len();

        info!(
            owned = report.owned_apps,
            skipped = report.skipped_apps,
            "discovered owned apps"
        );
        Ok(owned)
    }

    async fn request_tokens(
        &self,
        owned: &BTreeSet<u32>,
        payload: &mut CredentialPayload,
        report: &mut RunReport,
    ) -> DumpResult<Vec<AppRequest>> {
        let mut requests = Vec::with_capacity(owned.len());
        let chunks = owned.len().div_ceil(self.chunk_size.get());

        for (index, chunk) in chunked(owned.iter().copied(), self.chunk_size).enumerate() {
            let grants = self
                .call("access tokens", self.service.access_tokens(&chunk))
                .await?;

            report.tokens_granted += grants.granted.len();
            report.tokens_denied += grants.denied.len();

            // Apps without a token still get an info request: public metadata
            // is readable with a zero token.
            for app_id in chunk {
                let access_token = grants.granted.get(&app_id).copied().unwrap_or(0);
                if payload.insert_app(app_id, access_token) {
                    report.tokens_nonzero += 1;
                }
                requests.push(AppRequest {
                    app_id,
                    access_token,
                });
            }

            self.emit(ProgressEvent::Tokens {
                chunk: index + 1,
                chunks,
                granted: report.tokens_granted,
                denied: report.tokens_denied,
                nonzero: report.tokens_nonzero,
            });
        }

        info!(
            granted = report.tokens_granted,
            denied = report.tokens_denied,
            nonzero = report.tokens_nonzero,
            "received app tokens"
        );
        Ok(requests)
    }

    async fn request_depot_keys(
        &self,
        requests: &[AppRequest],
        known: &KnownDepots,
        payload: &mut CredentialPayload,
        report: &mut RunReport,
    ) -> DumpResult<()> {
        let mut requested = HashSet::new();
        let chunks = requests.len().div_ceil(self.chunk_size.get());

        for (index, chunk) in chunked(requests.iter().copied(), self.chunk_size).enumerate() {
            let mut calls = JoinSet::new();

            // Every app's default depot shares its ID.
            for request in &chunk {
                let pair = (request.app_id, request.app_id);
                if self.should_request(pair, known, payload, &mut requested, report) {
                    self.spawn_key_request(&mut calls, request.app_id, request.app_id);
                }
            }

            // Returning early drops `calls`, which aborts the spawned key requests.
            let infos = self.call("app info", self.service.app_info(&chunk)).await?;

            for app in &infos {
                for depot in &app.depots {
                    if depot.is_redistributable() {
                        report.redistributable += 1;
                        continue;
                    }

                    let Some(depot_id) = depot.depot_id() else {
                        debug!(app_id = app.app_id, name = %depot.name, "skipping non-numeric depot");
                        report.unparsable += 1;
                        continue;
                    };

                    let pair = (depot_id, app.app_id);
                    if self.should_request(pair, known, payload, &mut requested, report) {
                        self.spawn_key_request(&mut calls, depot_id, app.app_id);
                    }
                }
            }

            while let Some(joined) = calls.join_next().await {
                let result = match joined {
                    Ok(key) => {
                        if key.result.is_ok() && !payload.insert_depot_key(key.depot_id, &key.key) {
                            warn!(depot_id = key.depot_id, "depot key reported OK but empty");
                        }
                        key.result
                    }
                    Err(e) => {
                        warn!(error = %e, "depot key task failed");
                        ResultCode::FAIL
                    }
                };
                *report.results.entry(result).or_default() += 1;

                self.emit(ProgressEvent::DepotKeys {
                    chunk: index + 1,
                    chunks,
                    depots: payload.depots.len(),
                    pending: calls.len(),
                });
            }
        }

        Ok(())
    }

    /// Pairs are `(depot, owning app)`. A depot declared by several apps is
    /// asked once per app, so a denial under one owner does not hide it from
    /// the others.
    fn should_request(
        &self,
        (depot_id, app_id): (u32, u32),
        known: &KnownDepots,
        payload: &CredentialPayload,
        requested: &mut HashSet<(u32, u32)>,
        report: &mut RunReport,
    ) -> bool {
        if self.skip_known_depots {
            if known.is_known(depot_id) {
                report.skipped_known += 1;
                return false;
            }
            if payload.depots.contains_key(&depot_id) {
                report.already_keyed += 1;
                return false;
            }
        }
        if !requested.insert((depot_id, app_id)) {
            return false;
        }
        report.key_requests += 1;
        true
    }

    fn spawn_key_request(&self, calls: &mut JoinSet<DepotKey>, depot_id: u32, app_id: u32) {
        let service = Arc::clone(&self.service);
        let timeout = self.timeout;

        calls.spawn(async move {
            let failed = |result| DepotKey {
                depot_id,
                app_id,
                result,
                key: Vec::new(),
            };

            match tokio::time::timeout(timeout, service.depot_decryption_key(depot_id, app_id))
                .await
            {
                Ok(Ok(key)) => DepotKey {
                    depot_id,
                    app_id,
                    ..key
                },
                Ok(Err(e)) => {
                    debug!(depot_id, app_id, error = %e, "depot key request failed");
                    failed(ResultCode::FAIL)
                }
                Err(_) => {
                    debug!(depot_id, app_id, "depot key request timed out");
                    failed(ResultCode::TIMEOUT)
                }
            }
        });
    }

    async fn call<T, F>(&self, operation: &'static str, fut: F) -> DumpResult<T>
    where
        F: Future<Output = DumpResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DumpError::Timeout {
                operation,
                timeout: self.timeout,
            }),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sink) = &self.progress {
            sink(event);
        }
    }
}

/// Record license tokens and collect the package IDs to look up.
fn ingest_licenses(
    licenses: &[License],
    payload: &mut CredentialPayload,
    report: &mut RunReport,
) -> BTreeSet<u32> {
    let mut package_ids = BTreeSet::new();

    for license in licenses {
        if payload.insert_sub(license.package_id, license.access_token) {
            report.license_tokens += 1;
        }
        package_ids.insert(license.package_id);
    }
    report.licenses = licenses.len();

    info!(
        licenses = report.licenses,
        tokens = report.license_tokens,
        "ingested licenses"
    );
    package_ids
}
