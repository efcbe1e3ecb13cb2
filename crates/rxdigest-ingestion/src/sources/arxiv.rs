//! arXiv API client.
//!
//! Endpoint: https://export.arxiv.org/api/query (Atom 1.0 feed)
//!
//! Results are paged with `start`/`max_results` and sorted by submission
//! date. The API occasionally answers with an empty feed even though
//! `opensearch:totalResults` says more entries exist; such pages are
//! reported as "no data yet" so the retry policy asks again.

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use rxdigest_common::SandboxClient as Client;
use tracing::{debug, instrument, warn};

use super::{paginate, LiteratureSource, Page, PageFetcher, Pagination, SourceRun};
use crate::error::SourceError;
use crate::models::{
    authors_or_placeholder, clean_text, parse_published, unique_categories, NormaliseError,
    Record, RecordSource,
};
use crate::query::SearchQuery;
use crate::retry::RetryPolicy;

pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";
const DEFAULT_PAGE_SIZE: usize = 100;
/// arXiv asks clients to leave three seconds between consecutive calls.
const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(3);

lazy_static! {
    static ref VERSION_SUFFIX: Regex = Regex::new(r"v\d+$").unwrap();
}

pub struct ArxivClient {
    client: Client,
    base_url: String,
    page_size: usize,
    page_delay: Duration,
    retry: RetryPolicy,
}

impl ArxivClient {
    pub fn new(retry: RetryPolicy) -> Result<Self, SourceError> {
        Ok(Self {
            client: Client::new()?,
            base_url: ARXIV_API_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: DEFAULT_PAGE_DELAY,
            retry,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    async fn get_feed(&self, params: &[(&str, String)]) -> Result<ArxivFeed, SourceError> {
        let resp = self.client.get(&self.base_url)?.query(params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        let xml = resp.text().await?;
        parse_arxiv_feed(&xml)
    }

    /// Look up a single paper by arXiv id (with or without version).
    #[instrument(skip(self))]
    pub async fn fetch_by_id(&self, arxiv_id: &str) -> Result<Option<Record>, SourceError> {
        let params = [
            ("id_list", arxiv_id.to_string()),
            ("max_results", "1".to_string()),
        ];
        let feed = self.get_feed(&params).await?;
        let Some(entry) = feed.entries.into_iter().next() else {
            return Ok(None);
        };
        match entry.into_record() {
            Ok(record) => Ok(Some(record)),
            Err(e) => Err(SourceError::Malformed(format!("arXiv entry {arxiv_id}: {e}"))),
        }
    }
}

/// Pages through one `search_query`.
struct ArxivPager<'a> {
    arxiv: &'a ArxivClient,
    search_query: String,
}

#[async_trait]
impl<'a> PageFetcher for ArxivPager<'a> {
    fn name(&self) -> &str {
        "arxiv"
    }

    #[instrument(skip(self))]
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Option<Page>, SourceError> {
        if offset > 0 && !self.arxiv.page_delay.is_zero() {
            tokio::time::sleep(self.arxiv.page_delay).await;
        }

        let params = [
            ("search_query", self.search_query.clone()),
            ("start", offset.to_string()),
            ("max_results", limit.to_string()),
            ("sortBy", "submittedDate".to_string()),
            ("sortOrder", "descending".to_string()),
        ];
        let feed = self.arxiv.get_feed(&params).await?;

        debug!(offset, entries = feed.entries.len(), total = ?feed.total, "arXiv page");

        if feed.entries.is_empty() && feed.total.is_some_and(|total| offset < total) {
            return Ok(None);
        }

        let mut page = Page {
            fetched: feed.entries.len(),
            total: feed.total,
            ..Default::default()
        };
        for entry in feed.entries {
            let entry_id = entry.id.clone();
            match entry.into_record() {
                Ok(record) => page.records.push(record),
                Err(e) => {
                    warn!(entry = %entry_id, error = %e, "Skipping arXiv entry");
                    page.skipped += 1;
                }
            }
        }
        Ok(Some(page))
    }
}

#[async_trait]
impl LiteratureSource for ArxivClient {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    async fn fetch(&self, query: &SearchQuery, max_results: usize) -> Result<SourceRun, SourceError> {
        let pager = ArxivPager { arxiv: self, search_query: query.to_arxiv_query() };
        let paging = Pagination { page_size: self.page_size, max_results, retry: self.retry };
        Ok(paginate(&pager, paging).await)
    }
}

// ── Atom parsing ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ArxivFeed {
    entries: Vec<ArxivEntry>,
    total: Option<usize>,
}

#[derive(Debug, Default)]
struct ArxivEntry {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    categories: Vec<String>,
    pdf_url: Option<String>,
    doi: Option<String>,
}

impl ArxivEntry {
    fn into_record(self) -> Result<Record, NormaliseError> {
        let short_id = arxiv_short_id(&self.id).ok_or(NormaliseError::MissingField("id"))?;
        let title = clean_text(&self.title);
        if title.is_empty() {
            return Err(NormaliseError::MissingField("title"));
        }
        let published = parse_published(&self.published)
            .ok_or_else(|| NormaliseError::BadDate(self.published.clone()))?;

        let pdf_url = self
            .pdf_url
            .unwrap_or_else(|| format!("https://arxiv.org/pdf/{short_id}"));

        Ok(Record {
            id: arxiv_record_id(&short_id),
            title,
            abstract_text: clean_text(&self.summary),
            authors: authors_or_placeholder(self.authors),
            published,
            source: RecordSource::Arxiv,
            categories: unique_categories(self.categories),
            pdf_url,
            doi: self.doi,
            keyword_match_score: None,
            matched_keywords: None,
        })
    }
}

/// `http://arxiv.org/abs/2401.00001v2` → `2401.00001v2`.
pub fn arxiv_short_id(entry_id: &str) -> Option<String> {
    let tail = match entry_id.split_once("/abs/") {
        Some((_, tail)) => tail,
        None => entry_id.rsplit_once("/pdf/").map_or(entry_id, |(_, t)| t),
    };
    let tail = tail.trim().trim_end_matches(".pdf").trim_matches('/');
    if tail.is_empty() || tail.contains("://") {
        None
    } else {
        Some(tail.to_string())
    }
}

/// Stable record id: version suffix dropped, old-style `/` flattened.
pub fn arxiv_record_id(short_id: &str) -> String {
    let unversioned = VERSION_SUFFIX.replace(short_id, "");
    format!("arxiv_{}", unversioned.replace('/', "_"))
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
    Doi,
    Total,
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn on_element(e: &BytesStart<'_>, current: &mut Option<ArxivEntry>) {
    let Some(entry) = current.as_mut() else { return };
    match e.local_name().as_ref() {
        b"category" => {
            if let Some(term) = attr(e, b"term") {
                entry.categories.push(term);
            }
        }
        b"link" => {
            if attr(e, b"title").as_deref() == Some("pdf") {
                entry.pdf_url = attr(e, b"href");
            }
        }
        _ => {}
    }
}

/// Parse an arXiv Atom feed.
/// API-level errors come back as a feed with a single error entry.
fn parse_arxiv_feed(xml: &str) -> Result<ArxivFeed, SourceError> {
    let mut feed = ArxivFeed::default();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut saw_feed  = false;
    let mut current: Option<ArxivEntry> = None;
    let mut in_author = false;
    let mut field: Option<Field> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"feed"   => saw_feed = true,
                    b"entry"  => current = Some(ArxivEntry::default()),
                    b"author" => in_author = true,
                    b"totalResults" => field = Some(Field::Total),
                    b"id"        if current.is_some() => field = Some(Field::Id),
                    b"title"     if current.is_some() => field = Some(Field::Title),
                    b"summary"   if current.is_some() => field = Some(Field::Summary),
                    b"published" if current.is_some() => field = Some(Field::Published),
                    b"doi"       if current.is_some() => field = Some(Field::Doi),
                    b"name"      if in_author         => field = Some(Field::AuthorName),
                    _ => on_element(e, &mut current),
                }
                text.clear();
            }
            Event::Empty(ref e) => on_element(e, &mut current),
            Event::Text(ref e) => {
                if field.is_some() {
                    let chunk = e
                        .unescape()
                        .map_err(|err| SourceError::Malformed(format!("XML text: {err}")))?;
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(&chunk);
                }
            }
            Event::End(ref e) => {
                let name = e.local_name();
                if let Some(f) = field.take() {
                    let value = std::mem::take(&mut text);
                    if f == Field::Total {
                        feed.total = value.trim().parse().ok();
                    } else if let Some(entry) = current.as_mut() {
                        match f {
                            Field::Id         => entry.id = value,
                            Field::Title      => entry.title = value,
                            Field::Summary    => entry.summary = value,
                            Field::Published  => entry.published = value,
                            Field::AuthorName => entry.authors.push(clean_text(&value)),
                            Field::Doi        => entry.doi = Some(value.trim().to_string()),
                            Field::Total      => {}
                        }
                    }
                }
                match name.as_ref() {
                    b"author" => in_author = false,
                    b"entry" => {
                        if let Some(entry) = current.take() {
                            if entry.id.contains("/api/errors") {
                                return Err(SourceError::Malformed(format!(
                                    "arXiv API error: {}",
                                    clean_text(&entry.summary)
                                )));
                            }
                            feed.entries.push(entry);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_feed {
        return Err(SourceError::Malformed("response is not an Atom feed".into()));
    }
    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <id>http://arxiv.org/api/abc</id>
  <title type="html">ArXiv Query: search_query=all:pathology</title>
  <opensearch:totalResults>2</opensearch:totalResults>
  <opensearch:startIndex>0</opensearch:startIndex>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v2</id>
    <published>2024-01-02T18:00:00Z</published>
    <title>Deep Learning for
      Computational Pathology</title>
    <summary>  We study whole slide images &amp; tissue.  </summary>
    <author><name>Jane Doe</name></author>
    <author><name>John Smith</name></author>
    <arxiv:doi>10.1000/xyz</arxiv:doi>
    <link href="http://arxiv.org/abs/2401.00001v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2401.00001v2" rel="related" type="application/pdf"/>
    <arxiv:primary_category term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.AI" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/hep-th/9901001v1</id>
    <published>1999-01-01T00:00:00Z</published>
    <title>Old style identifier</title>
    <summary></summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_entries() {
        let feed = parse_arxiv_feed(FEED).unwrap();
        assert_eq!(feed.total, Some(2));
        assert_eq!(feed.entries.len(), 2);

        let r = feed.entries.into_iter().next().unwrap().into_record().unwrap();
        assert_eq!(r.id, "arxiv_2401.00001");
        assert_eq!(r.title, "Deep Learning for Computational Pathology");
        assert_eq!(r.abstract_text, "We study whole slide images & tissue.");
        assert_eq!(r.authors, vec!["Jane Doe", "John Smith"]);
        assert_eq!(r.published, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(r.categories, vec!["cs.CV", "cs.AI"]);
        assert_eq!(r.pdf_url, "http://arxiv.org/pdf/2401.00001v2");
        assert_eq!(r.doi.as_deref(), Some("10.1000/xyz"));
        assert_eq!(r.source, RecordSource::Arxiv);
    }

    #[test]
    fn test_missing_fields_use_placeholders() {
        let feed = parse_arxiv_feed(FEED).unwrap();
        let r = feed.entries.into_iter().nth(1).unwrap().into_record().unwrap();
        assert_eq!(r.id, "arxiv_hep-th_9901001");
        assert_eq!(r.authors, vec![crate::models::UNKNOWN_AUTHOR]);
        assert_eq!(r.abstract_text, "");
        assert_eq!(r.pdf_url, "https://arxiv.org/pdf/hep-th/9901001v1");
    }

    #[test]
    fn test_entry_without_date_is_rejected() {
        let entry = ArxivEntry {
            id: "http://arxiv.org/abs/2401.00002v1".into(),
            title: "No date".into(),
            ..Default::default()
        };
        assert!(matches!(entry.into_record(), Err(NormaliseError::BadDate(_))));

        let entry = ArxivEntry { title: "No id".into(), published: "2024-01-01".into(), ..Default::default() };
        assert_eq!(entry.into_record().unwrap_err(), NormaliseError::MissingField("id"));
    }

    #[test]
    fn test_api_error_entry_is_malformed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <opensearch:totalResults xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">1</opensearch:totalResults>
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234</id>
    <title>Error</title>
    <summary>incorrect id format for 1234</summary>
  </entry>
</feed>"#;
        let err = parse_arxiv_feed(xml).unwrap_err();
        assert!(err.is_malformed());
        assert!(err.to_string().contains("incorrect id format"));
    }

    #[test]
    fn test_non_feed_is_malformed() {
        assert!(parse_arxiv_feed("<html><body>Service Unavailable</body></html>")
            .unwrap_err()
            .is_malformed());
    }

    #[test]
    fn test_short_and_record_ids() {
        assert_eq!(arxiv_short_id("http://arxiv.org/abs/2401.00001v3").as_deref(), Some("2401.00001v3"));
        assert_eq!(arxiv_short_id("https://arxiv.org/pdf/2401.00001.pdf").as_deref(), Some("2401.00001"));
        assert_eq!(arxiv_short_id("").as_deref(), None);
        assert_eq!(arxiv_record_id("2401.00001v3"), "arxiv_2401.00001");
        assert_eq!(arxiv_record_id("math/0501001"), "arxiv_math_0501001");
    }
}
