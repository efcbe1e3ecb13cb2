//! bioRxiv / medRxiv API client.
//!
//! Endpoint: https://api.biorxiv.org/details/{server}/{start}/{end}/{cursor}
//!
//! The details endpoint has no keyword search. It lists every preprint posted
//! in a date window, 100 per call, so records are pre-filtered here with the
//! client-side query matcher before they reach the pipeline.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rxdigest_common::SandboxClient as Client;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{paginate, LiteratureSource, Page, PageFetcher, Pagination, SourceRun};
use crate::error::SourceError;
use crate::models::{
    clean_text, parse_published, title_hash, unique_categories, NormaliseError, Record,
    RecordSource, UNKNOWN_AUTHOR,
};
use crate::query::SearchQuery;
use crate::retry::RetryPolicy;

pub const BIORXIV_API_URL: &str = "https://api.biorxiv.org";
/// Fixed by the API.
const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Server {
    BioRxiv,
    MedRxiv,
}

impl Server {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BioRxiv => "biorxiv",
            Self::MedRxiv => "medrxiv",
        }
    }

    fn launch_date(&self) -> NaiveDate {
        match self {
            Self::BioRxiv => NaiveDate::from_ymd_opt(2013, 11, 1),
            Self::MedRxiv => NaiveDate::from_ymd_opt(2019, 6, 1),
        }
        .unwrap_or(NaiveDate::MIN)
    }

    fn content_host(&self) -> &'static str {
        match self {
            Self::BioRxiv => "https://www.biorxiv.org",
            Self::MedRxiv => "https://www.medrxiv.org",
        }
    }

    fn placeholder_category(&self) -> &'static str {
        match self {
            Self::BioRxiv => "bioRxiv Preprint",
            Self::MedRxiv => "medRxiv Preprint",
        }
    }

    fn record_source(&self) -> RecordSource {
        match self {
            Self::BioRxiv => RecordSource::BioRxiv,
            Self::MedRxiv => RecordSource::MedRxiv,
        }
    }
}

pub struct BioRxivClient {
    client: Client,
    server: Server,
    base_url: String,
    retry: RetryPolicy,
}

impl BioRxivClient {
    pub fn new(server: Server, retry: RetryPolicy) -> Result<Self, SourceError> {
        Ok(Self {
            client: Client::new()?,
            server,
            base_url: BIORXIV_API_URL.to_string(),
            retry,
        })
    }

    pub fn new_medrxiv(retry: RetryPolicy) -> Result<Self, SourceError> {
        Self::new(Server::MedRxiv, retry)
    }

    pub fn new_biorxiv(retry: RetryPolicy) -> Result<Self, SourceError> {
        Self::new(Server::BioRxiv, retry)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `Ok(None)` when the body is empty.
    async fn get_details(&self, url: &str) -> Result<Option<DetailsResponse>, SourceError> {
        let resp = self.client.get(url)?.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Http { status: status.as_u16(), url: url.to_string() });
        }
        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&body)?))
    }

    /// Resolve a single preprint by DOI.
    #[instrument(skip(self))]
    pub async fn fetch_by_doi(&self, doi: &str) -> Result<Option<Record>, SourceError> {
        let url = format!("{}/details/{}/{}", self.base_url, self.server.as_str(), doi);
        let Some(details) = self.get_details(&url).await? else {
            return Ok(None);
        };
        if !details.is_ok() {
            debug!(doi, status = ?details.status(), "DOI not found");
            return Ok(None);
        }
        // Later versions of the same preprint come last.
        let Some(value) = details.collection.into_iter().last() else {
            return Ok(None);
        };
        let malformed =
            |e: String| SourceError::Malformed(format!("{} DOI {doi}: {e}", self.server.as_str()));
        let item = Preprint::from_value(value).map_err(|e| malformed(e.to_string()))?;
        item.into_record(self.server).map(Some).map_err(|e| malformed(e.to_string()))
    }

    /// Date window for a query: `since..today`, or from launch when unrestricted.
    fn window(&self, query: &SearchQuery) -> (NaiveDate, NaiveDate) {
        let today = Utc::now().date_naive();
        let start = query.since.unwrap_or_else(|| self.server.launch_date());
        (start.min(today), today)
    }
}

struct DetailsPager<'a> {
    source: &'a BioRxivClient,
    query: &'a SearchQuery,
    start: NaiveDate,
    end: NaiveDate,
}

#[async_trait]
impl<'a> PageFetcher for DetailsPager<'a> {
    fn name(&self) -> &str {
        self.source.server.as_str()
    }

    #[instrument(skip(self))]
    async fn fetch_page(&self, offset: usize, _limit: usize) -> Result<Option<Page>, SourceError> {
        let server = self.source.server;
        let url = format!(
            "{}/details/{}/{}/{}/{}",
            self.source.base_url,
            server.as_str(),
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d"),
            offset
        );
        let Some(details) = self.source.get_details(&url).await? else {
            return Ok(None);
        };

        if !details.is_ok() {
            info!(source = server.as_str(), status = ?details.status(), "Listing finished");
            return Ok(Some(Page::default()));
        }

        let mut page = Page {
            fetched: details.collection.len(),
            total: details.total(),
            ..Default::default()
        };
        for value in details.collection {
            // One unreadable entry must not cost the rest of the page.
            let item = match Preprint::from_value(value) {
                Ok(item) => item,
                Err(e) => {
                    warn!(source = server.as_str(), offset, error = %e, "Skipping unreadable preprint");
                    page.skipped += 1;
                    continue;
                }
            };
            let text = format!("{} {}", item.title, item.abstract_text);
            if !self.query.matches_text(&text) {
                continue;
            }
            let doi = item.doi.clone();
            match item.into_record(server) {
                Ok(record) => page.records.push(record),
                Err(e) => {
                    warn!(source = server.as_str(), doi = %doi, error = %e, "Skipping preprint");
                    page.skipped += 1;
                }
            }
        }
        debug!(
            source = server.as_str(),
            offset,
            fetched = page.fetched,
            matched = page.records.len(),
            "Details page"
        );
        Ok(Some(page))
    }
}

#[async_trait]
impl LiteratureSource for BioRxivClient {
    fn name(&self) -> &'static str {
        self.server.as_str()
    }

    async fn fetch(&self, query: &SearchQuery, max_results: usize) -> Result<SourceRun, SourceError> {
        let (start, end) = self.window(query);
        info!(source = self.server.as_str(), %start, %end, "Listing preprints");
        let pager = DetailsPager { source: self, query, start, end };
        let paging = Pagination { page_size: PAGE_SIZE, max_results, retry: self.retry };
        Ok(paginate(&pager, paging).await)
    }
}

// ── JSON payload ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    messages: Vec<Message>,
    /// Items are decoded one by one so a single bad entry stays contained.
    #[serde(default)]
    collection: Vec<Value>,
}

impl DetailsResponse {
    fn status(&self) -> Option<&str> {
        self.messages.first().map(|m| m.status.as_str())
    }

    fn is_ok(&self) -> bool {
        self.status() == Some("ok")
    }

    fn total(&self) -> Option<usize> {
        self.messages.first().and_then(|m| m.total.as_ref()).and_then(Count::as_usize)
    }
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    status: String,
    #[serde(default)]
    total: Option<Count>,
}

/// The API reports counts sometimes as numbers, sometimes as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Count {
    Number(usize),
    Text(String),
}

impl Count {
    fn as_usize(&self) -> Option<usize> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Preprint {
    #[serde(default, deserialize_with = "lenient_string")]
    doi: String,
    #[serde(default, deserialize_with = "lenient_string")]
    title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    authors: String,
    #[serde(default, deserialize_with = "lenient_string")]
    date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    version: String,
    #[serde(default, deserialize_with = "lenient_string")]
    category: String,
    #[serde(default, rename = "abstract", deserialize_with = "lenient_string")]
    abstract_text: String,
}

/// Accepts `null` as empty and numbers as their decimal text.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected a string, found {other}"))),
    }
}

impl Preprint {
    fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    fn into_record(self, server: Server) -> Result<Record, NormaliseError> {
        let title = clean_text(&self.title);
        if title.is_empty() {
            return Err(NormaliseError::MissingField("title"));
        }
        let published =
            parse_published(&self.date).ok_or_else(|| NormaliseError::BadDate(self.date.clone()))?;

        let doi = self.doi.trim().to_string();
        let (id, pdf_url, doi) = if doi.is_empty() {
            let id = format!("{}_{}", server.as_str(), title_hash(&title));
            (id, String::new(), None)
        } else {
            let pdf_url = match self.version.trim() {
                "" => format!("{}/content/{doi}.full.pdf", server.content_host()),
                v => format!("{}/content/{doi}v{v}.full.pdf", server.content_host()),
            };
            (doi_record_id(server.as_str(), &doi), pdf_url, Some(doi))
        };

        let authors: Vec<String> = self
            .authors
            .split(';')
            .map(clean_text)
            .filter(|a| !a.is_empty())
            .collect();

        let category = clean_text(&self.category);
        let categories = if category.is_empty() {
            vec![server.placeholder_category().to_string()]
        } else {
            unique_categories([category])
        };

        Ok(Record {
            id,
            title,
            abstract_text: clean_text(&self.abstract_text),
            authors: if authors.is_empty() { vec![UNKNOWN_AUTHOR.to_string()] } else { authors },
            published,
            source: server.record_source(),
            categories,
            pdf_url,
            doi,
            keyword_match_score: None,
            matched_keywords: None,
        })
    }
}

/// `10.1101/2024.01.02.24300001` → `medrxiv_10_1101_2024_01_02_24300001`.
pub fn doi_record_id(prefix: &str, doi: &str) -> String {
    format!("{prefix}_{}", doi.replace(['/', '.'], "_"))
}
