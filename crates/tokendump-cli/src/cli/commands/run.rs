use std::sync::Arc;

use anyhow::Context;
use tokendump_core::{
    BackendClient, DumperConfig, GatewayClient, KnownDepots, PipelineRun, ProgressEvent,
    ProgressSink, Requester, RunReport, RunStatus,
};
use tracing::{debug, error, info, warn};

use super::super::args::RunArgs;
use super::load_config;
use crate::exit_codes::{RUN_ABORTED, SUCCESS};

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let mut config = load_config(&args.config).await?;
    if args.no_submit {
        config.submit = false;
    }
    if args.no_skip_known {
        config.skip_known_depots = false;
    }
    if let Some(dump) = args.dump {
        config.dump_path = Some(dump);
    }

    execute(&config).await
}

/// Collect, dump, submit and cache with a resolved config. Returns the exit code.
pub(crate) async fn execute(config: &DumperConfig) -> anyhow::Result<i32> {
    let backend = BackendClient::new(config)?;
    let gateway = GatewayClient::new(config)?;

    let mut known = KnownDepots::new();
    if let Err(e) = known.load(&config.known_depots_path).await {
        warn!(error = %e, "known depot cache only partially loaded");
    }
    if let Err(e) = known.fetch_server_skip_list(&backend).await {
        warn!(error = %e, "could not fetch known depots from backend, not filtering");
    }
    debug!(
        cached = known.previously_sent().len(),
        server = known.server_len(),
        "known depots ready"
    );

    let session = gateway
        .session()
        .await
        .context("failed to fetch session from gateway")?;
    info!(licenses = session.licenses.len(), "logged-in session found");

    let requester = Requester::new(Arc::new(gateway), config).with_progress(progress_sink());
    let PipelineRun {
        payload,
        report,
        status,
    } = requester
        .process_license_list(&session.licenses, &known)
        .await;
    let payload = payload.with_steam_id(session.steam_id);

    print_report(&report);

    let mut code = match &status {
        RunStatus::Completed => SUCCESS,
        RunStatus::Aborted { stage, error } => {
            eprintln!("Collection stopped during {}: {}", stage, error);
            RUN_ABORTED
        }
    };

    if let Some(path) = &config.dump_path {
        if let Err(e) = payload.snapshot().write_to(path).await {
            warn!(error = %e, "failed to write payload dump");
        }
    }

    // The cache only grows after the backend accepted the depots.
    let mut cache_changed = false;
    if payload.is_empty() {
        info!("nothing to submit");
    } else if !config.submit {
        info!("submission disabled");
    } else {
        debug!(backend = backend.base_url(), "submitting payload");
        match backend.submit(&payload).await {
            Ok(_) => {
                let added = known.mark_submitted(payload.depots.keys().copied());
                cache_changed = added > 0;
                println!(
                    "Submitted {} subs, {} apps, {} depots ({} newly cached)",
                    payload.subs.len(),
                    payload.apps.len(),
                    payload.depots.len(),
                    added
                );
            }
            Err(e) => {
                error!(error = %e, "submission failed");
                eprintln!("Submission failed: {}", e);
                code = e.exit_code();
            }
        }
    }

    if cache_changed {
        if let Err(e) = known.save(&config.known_depots_path).await {
            warn!(error = %e, "failed to save known depot cache");
        }
    }

    Ok(code)
}

fn progress_sink() -> ProgressSink {
    Arc::new(|event: ProgressEvent| match event {
        ProgressEvent::OwnedApps {
            chunk,
            chunks,
            owned,
        } => info!("[{}/{}] owned apps: {}", chunk, chunks, owned),
        ProgressEvent::Tokens {
            chunk,
            chunks,
            granted,
            denied,
            nonzero,
        } => info!(
            "[{}/{}] app tokens: {} granted, {} denied, {} non-zero",
            chunk, chunks, granted, denied, nonzero
        ),
        ProgressEvent::DepotKeys {
            chunk,
            chunks,
            depots,
            pending,
        } => {
            if pending == 0 {
                info!("[{}/{}] depot keys: {}", chunk, chunks, depots);
            } else {
                debug!(
                    "[{}/{}] depot keys: {} ({} pending)",
                    chunk, chunks, depots, pending
                );
            }
        }
    })
}

fn print_report(report: &RunReport) {
    println!(
        "Licenses: {} ({} with tokens)",
        report.licenses, report.license_tokens
    );
    println!(
        "Apps: {} owned, {} skipped by config",
        report.owned_apps, report.skipped_apps
    );
    println!(
        "Tokens: {} granted, {} denied, {} non-zero",
        report.tokens_granted, report.tokens_denied, report.tokens_nonzero
    );
    println!(
        "Depot keys: {} requested, {} already known, {} keyed earlier, {} redistributable",
        report.key_requests, report.skipped_known, report.already_keyed, report.redistributable
    );
    if !report.results.is_empty() {
        println!("Results: {}", report.result_summary());
    }
}
