//! Preprint source clients and the pagination loop they share.

pub mod arxiv;
pub mod biorxiv;
pub mod manual;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::models::Record;
use crate::query::SearchQuery;
use crate::retry::{retry, RetryPolicy};

/// Consecutive unparseable pages after which a run gives up.
const MAX_CONSECUTIVE_MALFORMED: usize = 2;

/// Common interface for all preprint source clients.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Short lowercase name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Fetch up to `max_results` normalized records matching `query`.
    ///
    /// Page-level failures degrade to partial results inside the returned
    /// [`SourceRun`]; an `Err` means the source could not run at all.
    async fn fetch(
        &self,
        query: &SearchQuery,
        max_results: usize,
    ) -> Result<SourceRun, SourceError>;
}

/// One page of normalized records.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,
    /// Items the remote reported for this page, before normalization and
    /// client-side filtering. Zero means the catalog is exhausted.
    pub fetched: usize,
    /// Items dropped because they could not be normalized.
    pub skipped: usize,
    /// Total matches the remote claims to hold, when it says.
    pub total: Option<usize>,
}

/// Something that can fetch a page at an offset.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means "no data yet" and is retried like a transient failure.
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Option<Page>, SourceError>;
}

/// Per-source counters surfaced by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub pages: usize,
    pub emitted: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub malformed_pages: usize,
    /// Set when the run ended early because of a failure.
    pub error: Option<String>,
}

/// Outcome of one adapter run.
#[derive(Debug, Clone, Default)]
pub struct SourceRun {
    pub records: Vec<Record>,
    pub report: SourceReport,
}

impl SourceRun {
    pub fn empty(source: &str) -> Self {
        Self {
            records: Vec::new(),
            report: SourceReport { source: source.to_string(), ..Default::default() },
        }
    }

    /// Add a record unless its id was already emitted in this run.
    /// Returns whether it was kept.
    pub fn push_unique(&mut self, seen: &mut HashSet<String>, record: Record) -> bool {
        if seen.insert(record.id.clone()) {
            self.records.push(record);
            self.report.emitted += 1;
            true
        } else {
            self.report.duplicates += 1;
            false
        }
    }
}

/// Paging parameters for one run.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page_size: usize,
    pub max_results: usize,
    pub retry: RetryPolicy,
}

/// Walk a catalog page by page.
///
/// The offset only moves forward. The run stops when a page comes back
/// empty, the reported total is reached, or `max_results` records were
/// emitted; in the last case no further page is requested.
pub async fn paginate<F>(fetcher: &F, paging: Pagination) -> SourceRun
where
    F: PageFetcher + ?Sized,
{
    let name = fetcher.name().to_string();
    let page_size = paging.page_size.max(1);
    let mut run = SourceRun::empty(&name);
    let mut seen: HashSet<String> = HashSet::new();
    let mut offset = 0usize;
    let mut malformed_streak = 0usize;

    while run.records.len() < paging.max_results {
        let limit = page_size.min(paging.max_results - run.records.len());

        let page = match retry(&paging.retry, &name, || fetcher.fetch_page(offset, limit)).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                info!(source = %name, offset, "Source returned no data, ending run");
                break;
            }
            Err(e) if e.is_malformed() => {
                run.report.malformed_pages += 1;
                malformed_streak += 1;
                warn!(source = %name, offset, error = %e, "Skipping malformed page");
                if malformed_streak >= MAX_CONSECUTIVE_MALFORMED {
                    run.report.error = Some(e.to_string());
                    break;
                }
                // Step over a whole page even when fewer items were asked for.
                offset += page_size;
                continue;
            }
            Err(e) => {
                warn!(
                    source = %name,
                    offset,
                    collected = run.records.len(),
                    error = %e,
                    "Page fetch failed, keeping partial results"
                );
                run.report.error = Some(e.to_string());
                break;
            }
        };

        malformed_streak = 0;
        run.report.pages += 1;
        run.report.skipped += page.skipped;

        if page.fetched == 0 {
            debug!(source = %name, offset, "Empty page, catalog exhausted");
            break;
        }

        for record in page.records {
            if run.records.len() >= paging.max_results {
                break;
            }
            run.push_unique(&mut seen, record);
        }

        offset += page.fetched;
        if page.total.is_some_and(|total| offset >= total) {
            debug!(source = %name, offset, "Reached reported total");
            break;
        }
    }

    info!(
        source = %name,
        pages = run.report.pages,
        emitted = run.report.emitted,
        skipped = run.report.skipped,
        duplicates = run.report.duplicates,
        "Source run complete"
    );
    run
}
