//! Collection command handlers.
//!
//! These assemble the pipeline from config plus CLI overrides and drive it
//! to completion. Unit-level failures are accounted for in the run summary
//! and ledger; only fatal pipeline errors propagate as a non-zero exit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use adgrab_client::{AdArchiveClient, AdFetcher, BackoffPolicy, RateLimiter, ResumeMode};
use adgrab_core::{AdQuery, AdStatus, AdType, AppConfig};
use adgrab_ingest::{
    AssetStore, CoordinatorOptions, DedupIndex, DownloadManager, IngestCoordinator, IngestSink,
    JsonlSink, RunState, RunSummary,
};

use crate::{AdStatusArg, AdTypeArg, QueryArgs, TuningArgs};

fn build_query(args: &QueryArgs) -> AdQuery {
    let mut query = AdQuery::default();
    if !args.countries.is_empty() {
        query.countries = args.countries.clone();
    }
    query.search_terms = args.search_terms.clone();
    query.page_ids = args.page_ids.clone();
    query.date_min = args.date_min;
    query.date_max = args.date_max;
    query.ad_type = match args.ad_type {
        AdTypeArg::All => AdType::All,
        AdTypeArg::Political => AdType::PoliticalAndIssue,
    };
    query.ad_status = match args.ad_status {
        AdStatusArg::All => AdStatus::All,
        AdStatusArg::Active => AdStatus::Active,
        AdStatusArg::Inactive => AdStatus::Inactive,
    };
    query
}

struct Assembled {
    fetcher_client: Arc<AdArchiveClient>,
    downloads: Arc<DownloadManager>,
    index: Arc<DedupIndex>,
    sink: Arc<dyn IngestSink>,
    options: CoordinatorOptions,
    out_dir: PathBuf,
}

/// Builds every pipeline component below the fetcher from config plus CLI
/// overrides. Shared between `run` and `resume`: a resume opens the
/// dataset in append mode so the records ingested before the crash
/// survive, a fresh run truncates it.
fn assemble(
    config: &AppConfig,
    tuning: &TuningArgs,
    append_dataset: bool,
) -> anyhow::Result<Assembled> {
    let out_dir = tuning
        .out_dir
        .clone()
        .unwrap_or_else(|| config.out_dir.clone());
    let policy = BackoffPolicy {
        max_retries: tuning.max_retries.unwrap_or(config.max_retries),
        base_ms: config.backoff_base_ms,
        ..BackoffPolicy::default()
    };

    let api_limiter = Arc::new(RateLimiter::new(
        tuning.rate_limit.unwrap_or(config.api_rate_limit),
        Duration::from_secs(tuning.rate_window_secs.unwrap_or(config.api_rate_window_secs)),
    ));
    let fetcher_client = match &config.api_base_url {
        Some(base) => AdArchiveClient::with_base_url(
            &config.access_token,
            config.request_timeout_secs,
            &config.user_agent,
            api_limiter,
            policy,
            base,
        )?,
        None => AdArchiveClient::new(
            &config.access_token,
            config.request_timeout_secs,
            &config.user_agent,
            api_limiter,
            policy,
        )?,
    };

    let index_path = out_dir.join("state").join("dedup_index.json");
    let index = if config.persist_dedup_index && index_path.exists() {
        let index = DedupIndex::load(&index_path)?;
        tracing::info!(assets = index.len(), "restored dedup index");
        Arc::new(index)
    } else {
        Arc::new(DedupIndex::new())
    };

    let media_limiter = Arc::new(RateLimiter::new(
        config.media_rate_limit,
        Duration::from_secs(config.media_rate_window_secs),
    ));
    let downloads = Arc::new(DownloadManager::new(
        config.request_timeout_secs,
        &config.user_agent,
        tuning.workers.unwrap_or(config.download_workers),
        media_limiter,
        Arc::clone(&index),
        Arc::new(AssetStore::new(out_dir.join("assets"))),
        policy,
    )?);

    let dataset_path = out_dir.join("ads.jsonl");
    let sink: Arc<dyn IngestSink> = if append_dataset {
        Arc::new(JsonlSink::append(&dataset_path)?)
    } else {
        Arc::new(JsonlSink::create(&dataset_path)?)
    };
    let options = CoordinatorOptions {
        max_inflight_records: config.max_inflight_records,
        drain_timeout: Duration::from_secs(config.drain_timeout_secs),
        ocr_enabled: config.ocr_enabled,
        state_path: Some(out_dir.join("state").join("run_state.json")),
        ledger_path: Some(out_dir.join("state").join("ledger.json")),
        dedup_index_path: config.persist_dedup_index.then(|| index_path.clone()),
    };

    Ok(Assembled {
        fetcher_client: Arc::new(fetcher_client),
        downloads,
        index,
        sink,
        options,
        out_dir,
    })
}

async fn drive(coordinator: IngestCoordinator, out_dir: &Path) -> anyhow::Result<()> {
    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, draining in-flight downloads");
            token.cancel();
        }
    });

    let summary = coordinator.run().await?;
    report(&summary, out_dir);
    Ok(())
}

fn report(summary: &RunSummary, out_dir: &Path) {
    println!(
        "{} pages, {} records ({} completed, {} partial, {} failed)",
        summary.pages, summary.records, summary.completed, summary.partially_failed, summary.failed
    );
    println!(
        "{} bytes downloaded, {} bytes deduplicated, {} ledger errors",
        summary.bytes_downloaded, summary.bytes_deduplicated, summary.ledger_errors
    );
    if let Some(reason) = &summary.halted {
        println!("run halted early: {reason}");
    }
    println!("dataset written to {}", out_dir.display());
}

pub(crate) async fn run_new(
    config: &AppConfig,
    query_args: &QueryArgs,
    tuning: &TuningArgs,
) -> anyhow::Result<()> {
    let query = build_query(query_args);
    let parts = assemble(config, tuning, false)?;

    let mut fetcher = AdFetcher::new(Arc::clone(&parts.fetcher_client), query.clone());
    if let Some(max_pages) = tuning.max_pages {
        fetcher = fetcher.with_max_pages(max_pages);
    }

    let coordinator = IngestCoordinator::new(
        fetcher,
        parts.downloads,
        parts.index,
        parts.sink,
        RunState::new(query),
        parts.options,
    );
    drive(coordinator, &parts.out_dir).await
}

pub(crate) async fn run_resume(
    config: &AppConfig,
    state_path: &Path,
    strict: bool,
    tuning: &TuningArgs,
) -> anyhow::Result<()> {
    let state = RunState::load(state_path).await?;
    let cursor = state
        .cursor
        .clone()
        .ok_or_else(|| anyhow::anyhow!("state file has no cursor; start a fresh run instead"))?;
    tracing::info!(
        run_id = %state.run_id,
        page = cursor.page,
        records = state.records_ingested,
        "resuming run"
    );

    let parts = assemble(config, tuning, true)?;
    let mode = if strict {
        ResumeMode::Strict
    } else {
        ResumeMode::RestartOnExpiry
    };
    let mut fetcher = AdFetcher::resume(parts.fetcher_client, state.query.clone(), cursor, mode);
    if let Some(max_pages) = tuning.max_pages {
        fetcher = fetcher.with_max_pages(max_pages);
    }

    let coordinator = IngestCoordinator::new(
        fetcher,
        parts.downloads,
        parts.index,
        parts.sink,
        state,
        parts.options,
    );
    drive(coordinator, &parts.out_dir).await
}
