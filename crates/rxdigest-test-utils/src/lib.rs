//! Shared testing utilities for the rxdigest workspace.
//!
//! Record fixtures, canned Atom/JSON bodies for mock servers, and a
//! scripted [`LiteratureSource`] for pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rxdigest_ingestion::error::SourceError;
use rxdigest_ingestion::query::SearchQuery;
use rxdigest_ingestion::sources::{LiteratureSource, SourceRun};
use rxdigest_ingestion::{Record, RecordSource};

// ── Record fixtures ───────────────────────────────────────────────────────────

pub fn record(id: &str, source: RecordSource) -> Record {
    paper(id, source, &format!("Paper {id}"), "")
}

pub fn paper(id: &str, source: RecordSource, title: &str, abstract_text: &str) -> Record {
    Record {
        id: id.to_string(),
        title: title.to_string(),
        abstract_text: abstract_text.to_string(),
        authors: vec!["Test Author".to_string()],
        published: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        source,
        categories: vec!["q-bio.QM".to_string()],
        pdf_url: format!("https://example.org/{id}.pdf"),
        doi: None,
        keyword_match_score: None,
        matched_keywords: None,
    }
}

pub fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

// ── Mock server bodies ────────────────────────────────────────────────────────

/// Atom feed with one entry per `(arxiv id, title)` pair.
pub fn arxiv_feed(total: usize, entries: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/" xmlns:arxiv="http://arxiv.org/schemas/atom">
"#,
    );
    xml.push_str(&format!("  <opensearch:totalResults>{total}</opensearch:totalResults>\n"));
    for (id, title) in entries {
        xml.push_str(&format!(
            r#"  <entry>
    <id>http://arxiv.org/abs/{id}v1</id>
    <published>2024-03-01T12:00:00Z</published>
    <title>{title}</title>
    <summary>Abstract of {id}.</summary>
    <author><name>Test Author</name></author>
    <link title="pdf" href="http://arxiv.org/pdf/{id}v1" rel="related" type="application/pdf"/>
    <category term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
"#
        ));
    }
    xml.push_str("</feed>\n");
    xml
}

/// bio/medRxiv details body with one item per `(doi, title)` pair.
pub fn details_body(total: usize, items: &[(&str, &str)]) -> String {
    let collection: Vec<String> = items
        .iter()
        .map(|(doi, title)| {
            format!(
                r#"{{"doi":"{doi}","title":"{title}","authors":"Doe, J.; Roe, R.","date":"2024-03-01","version":"1","category":"pathology","abstract":"Abstract of {doi}."}}"#
            )
        })
        .collect();
    format!(
        r#"{{"messages":[{{"status":"ok","count":{},"total":"{total}"}}],"collection":[{}]}}"#,
        items.len(),
        collection.join(",")
    )
}

// ── Scripted source ───────────────────────────────────────────────────────────

/// Canned source: returns its records, fails, or stalls.
pub struct ScriptedSource {
    name: &'static str,
    records: Vec<Record>,
    error: Option<fn() -> SourceError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(name: &'static str, records: Vec<Record>) -> Self {
        Self { name, records, error: None, delay: Duration::ZERO, calls: AtomicUsize::new(0) }
    }

    pub fn failing(name: &'static str, error: fn() -> SourceError) -> Self {
        Self { error: Some(error), ..Self::new(name, Vec::new()) }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn boxed(self) -> Box<dyn LiteratureSource> {
        Box::new(self)
    }
}

#[async_trait]
impl LiteratureSource for ScriptedSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _query: &SearchQuery, max_results: usize) -> Result<SourceRun, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = self.error {
            return Err(error());
        }
        let mut run = SourceRun::empty(self.name);
        let mut seen = std::collections::HashSet::new();
        for record in self.records.iter().take(max_results) {
            run.push_unique(&mut seen, record.clone());
        }
        run.report.pages = 1;
        Ok(run)
    }
}
