//! Record builders for unit tests.

use chrono::NaiveDate;

use crate::models::{Record, RecordSource};

pub fn record(id: &str) -> Record {
    record_with_text(id, &format!("Paper {id}"), "")
}

pub fn record_with_text(id: &str, title: &str, abstract_text: &str) -> Record {
    Record {
        id: id.to_string(),
        title: title.to_string(),
        abstract_text: abstract_text.to_string(),
        authors: vec!["A. Author".to_string()],
        published: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        source: RecordSource::Arxiv,
        categories: vec!["cs.AI".to_string()],
        pdf_url: String::new(),
        doi: None,
        keyword_match_score: None,
        matched_keywords: None,
    }
}
