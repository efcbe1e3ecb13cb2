//! Hand-picked paper links.
//!
//! Links are resolved through the metadata APIs of the archive they point
//! at. Anything else is skipped; publisher landing pages are not scraped.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use tracing::{info, warn};
use url::Url;

use super::arxiv::{arxiv_short_id, ArxivClient};
use super::biorxiv::{BioRxivClient, Server};
use super::{LiteratureSource, SourceRun};
use crate::error::SourceError;
use crate::models::{Record, RecordSource};
use crate::query::SearchQuery;
use crate::retry::{retry, RetryPolicy};

lazy_static! {
    static ref CONTENT_SUFFIX: Regex =
        Regex::new(r"(v\d+)?(\.full\.pdf|\.full-text|\.full|\.abstract|\.pdf)?$").unwrap();
}

/// What a link points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    Arxiv(String),
    Preprint { server: Server, doi: String },
    Unsupported,
}

pub fn classify_link(link: &str) -> LinkTarget {
    let Ok(url) = Url::parse(link.trim()) else {
        return LinkTarget::Unsupported;
    };
    let host = url.host_str().unwrap_or_default();
    let path = url.path();

    if host == "arxiv.org" || host.ends_with(".arxiv.org") {
        if path.starts_with("/abs/") || path.starts_with("/pdf/") {
            if let Some(id) = arxiv_short_id(path) {
                return LinkTarget::Arxiv(id);
            }
        }
        return LinkTarget::Unsupported;
    }

    let server = match host.trim_start_matches("www.") {
        "biorxiv.org" => Server::BioRxiv,
        "medrxiv.org" => Server::MedRxiv,
        _ => return LinkTarget::Unsupported,
    };
    match path.strip_prefix("/content/") {
        Some(rest) if rest.starts_with("10.") => {
            let doi = CONTENT_SUFFIX.replace(rest.trim_end_matches('/'), "").into_owned();
            LinkTarget::Preprint { server, doi }
        }
        _ => LinkTarget::Unsupported,
    }
}

/// `manual_<last path segment>`.
pub fn manual_id(link: &str) -> Option<String> {
    let url = Url::parse(link.trim()).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(format!("manual_{segment}"))
}

pub struct ManualLinks {
    links: Vec<String>,
    arxiv: ArxivClient,
    biorxiv: BioRxivClient,
    medrxiv: BioRxivClient,
    retry: RetryPolicy,
}

impl ManualLinks {
    pub fn new(
        links: Vec<String>,
        arxiv: ArxivClient,
        biorxiv: BioRxivClient,
        medrxiv: BioRxivClient,
        retry: RetryPolicy,
    ) -> Self {
        Self { links, arxiv, biorxiv, medrxiv, retry }
    }

    async fn resolve(&self, target: &LinkTarget) -> Result<Option<Record>, SourceError> {
        match target {
            LinkTarget::Arxiv(id) => self.arxiv.fetch_by_id(id).await,
            LinkTarget::Preprint { server: Server::BioRxiv, doi } => self.biorxiv.fetch_by_doi(doi).await,
            LinkTarget::Preprint { server: Server::MedRxiv, doi } => self.medrxiv.fetch_by_doi(doi).await,
            LinkTarget::Unsupported => Ok(None),
        }
    }
}

#[async_trait]
impl LiteratureSource for ManualLinks {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn fetch(&self, _query: &SearchQuery, max_results: usize) -> Result<SourceRun, SourceError> {
        let mut run = SourceRun::empty(self.name());
        let mut seen = HashSet::new();

        for link in &self.links {
            if run.records.len() >= max_results {
                break;
            }
            let target = classify_link(link);
            let Some(id) = manual_id(link).filter(|_| target != LinkTarget::Unsupported) else {
                warn!(link = %link, "Unsupported link, skipping");
                run.report.skipped += 1;
                continue;
            };

            match retry(&self.retry, "manual", || self.resolve(&target)).await {
                Ok(Some(record)) => {
                    run.report.pages += 1;
                    run.push_unique(&mut seen, Record { id, source: RecordSource::Manual, ..record });
                }
                Ok(None) => {
                    warn!(link = %link, "No metadata found for link");
                    run.report.skipped += 1;
                }
                Err(e) if e.is_malformed() => {
                    warn!(link = %link, error = %e, "Unreadable metadata for link");
                    run.report.malformed_pages += 1;
                }
                Err(e) => {
                    warn!(link = %link, error = %e, "Failed to resolve link");
                    run.report.error = Some(e.to_string());
                }
            }
        }

        info!(
            links = self.links.len(),
            emitted = run.report.emitted,
            skipped = run.report.skipped,
            "Manual links resolved"
        );
        Ok(run)
    }
}
