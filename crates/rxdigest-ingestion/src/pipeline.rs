//! End-to-end acquisition pipeline.
//!
//! Orchestrates one run:
//!   1. Build the search query from domains, keyword groups and day window
//!   2. Run every configured source (sequentially or all at once)
//!   3. Merge in source order and drop duplicate ids
//!   4. Score and filter by keyword
//!   5. Emit progress events via broadcast channel
//!
//! A source that fails is logged and reported; the others still run.

use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::dedup::deduplicate;
use crate::error::SourceError;
use crate::filter::{filter_records, KeywordFilterConfig};
use crate::models::Record;
use crate::query::{build_query, QueryGroup, SearchQuery};
use crate::sources::{LiteratureSource, SourceReport, SourceRun};

// ── Job config ────────────────────────────────────────────────────────────────

/// Parameters for a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineJob {
    pub domains: Vec<String>,
    pub keyword_groups: Vec<QueryGroup>,
    /// Only papers submitted in the last `days` days; 0 disables the bound.
    pub days: u32,
    /// Cap per source.
    pub max_results: usize,
    /// Run all sources at once instead of one after the other.
    pub concurrent: bool,
    /// Give up on a source whose whole run takes longer than this.
    pub adapter_timeout_secs: Option<u64>,
    pub filter: KeywordFilterConfig,
}

impl Default for PipelineJob {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            keyword_groups: Vec::new(),
            days: 3,
            max_results: 50,
            concurrent: false,
            adapter_timeout_secs: None,
            filter: KeywordFilterConfig::default(),
        }
    }
}

// ── Progress events ───────────────────────────────────────────────────────────

/// Progress event emitted during a run (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct PipelineProgress {
    pub run_id: Uuid,
    pub stage: String,
    pub message: String,
    pub papers_found: usize,
    pub papers_retained: usize,
    pub error: Option<String>,
}

impl PipelineProgress {
    fn new(run_id: Uuid, stage: &str, message: &str) -> Self {
        Self {
            run_id,
            stage: stage.to_string(),
            message: message.to_string(),
            papers_found: 0,
            papers_retained: 0,
            error: None,
        }
    }
}

// ── Result summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    /// Rendered arXiv query, for the log and the report.
    pub query: String,
    pub records: Vec<Record>,
    pub papers_found: usize,
    pub duplicates_removed: usize,
    pub papers_retained: usize,
    pub source_reports: Vec<SourceReport>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

// ── Pipeline orchestrator ─────────────────────────────────────────────────────

/// Runs the pipeline for one job over the given sources.
///
/// Progress events are sent via `progress_tx` if provided.
/// Never fails: an empty record list is a valid outcome.
#[instrument(skip(sources, progress_tx))]
pub async fn run_pipeline(
    job: PipelineJob,
    sources: &[Box<dyn LiteratureSource>],
    progress_tx: Option<broadcast::Sender<PipelineProgress>>,
) -> PipelineResult {
    let run_id = Uuid::new_v4();
    let t0 = std::time::Instant::now();

    let query = build_query(&job.keyword_groups, &job.domains, job.days);
    let rendered = query.to_arxiv_query();
    info!(run_id = %run_id, query = %rendered, sources = sources.len(), "Starting pipeline");

    let emit = |prog: PipelineProgress| {
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(prog);
        }
    };

    emit(PipelineProgress::new(run_id, "search", &format!("Searching with query: {rendered}")));

    // ── 1. Collect records from every source ──────────────────────────────────
    let timeout = job.adapter_timeout_secs.map(Duration::from_secs);
    let outcomes: Vec<Result<SourceRun, SourceError>> = if job.concurrent {
        join_all(
            sources
                .iter()
                .map(|s| run_source(s.as_ref(), &query, job.max_results, timeout)),
        )
        .await
    } else {
        let mut outcomes = Vec::with_capacity(sources.len());
        for source in sources {
            outcomes.push(run_source(source.as_ref(), &query, job.max_results, timeout).await);
        }
        outcomes
    };

    let mut merged: Vec<Record> = Vec::new();
    let mut source_reports = Vec::with_capacity(sources.len());
    let mut errors = Vec::new();

    for (source, outcome) in sources.iter().zip(outcomes) {
        match outcome {
            Ok(run) => {
                info!(source = source.name(), n = run.records.len(), "Records retrieved");
                if let Some(ref e) = run.report.error {
                    errors.push(format!("Source {} incomplete: {e}", source.name()));
                }
                merged.extend(run.records);
                source_reports.push(run.report);
            }
            Err(e) => {
                let msg = format!("Source {} error: {e}", source.name());
                warn!("{}", &msg);
                emit(PipelineProgress { error: Some(msg.clone()), ..PipelineProgress::new(run_id, "search", source.name()) });
                source_reports.push(SourceReport {
                    source: source.name().to_string(),
                    error: Some(e.to_string()),
                    ..Default::default()
                });
                errors.push(msg);
            }
        }
    }

    let papers_found = merged.len();

    // ── 2. Deduplicate ────────────────────────────────────────────────────────
    emit(PipelineProgress {
        papers_found,
        ..PipelineProgress::new(run_id, "dedup", &format!("{papers_found} records found, deduplicating…"))
    });
    let (unique, duplicates_removed) = deduplicate(merged);

    // ── 3. Keyword filter ─────────────────────────────────────────────────────
    emit(PipelineProgress {
        papers_found,
        ..PipelineProgress::new(run_id, "filter", &format!("{} unique records, filtering…", unique.len()))
    });
    let records = filter_records(unique, &job.filter);
    let papers_retained = records.len();

    let duration_ms = t0.elapsed().as_millis() as u64;
    info!(
        run_id = %run_id,
        papers_found,
        duplicates_removed,
        papers_retained,
        errors = errors.len(),
        duration_ms,
        "Pipeline complete"
    );
    emit(PipelineProgress {
        papers_found,
        papers_retained,
        ..PipelineProgress::new(run_id, "complete", &format!("{papers_retained} records retained"))
    });

    PipelineResult {
        run_id,
        query: rendered,
        records,
        papers_found,
        duplicates_removed,
        papers_retained,
        source_reports,
        errors,
        duration_ms,
    }
}

async fn run_source(
    source: &dyn LiteratureSource,
    query: &SearchQuery,
    max_results: usize,
    timeout: Option<Duration>,
) -> Result<SourceRun, SourceError> {
    let fut = source.fetch(query, max_results);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            SourceError::Transient(format!("{} run timed out after {}s", source.name(), limit.as_secs()))
        })?,
        None => fut.await,
    }
}
