//! Live smoke test against export.arxiv.org.
//!
//! Run with: cargo test --package rxdigest-ingestion --test test_arxiv_live -- --ignored --nocapture

use rxdigest_ingestion::query::{build_query, QueryGroup};
use rxdigest_ingestion::retry::RetryPolicy;
use rxdigest_ingestion::sources::arxiv::ArxivClient;
use rxdigest_ingestion::sources::LiteratureSource;
use tokio_test::assert_ok;

#[tokio::test]
#[ignore] // Requires network access
async fn test_arxiv_search_pathology() {
    let client = assert_ok!(ArxivClient::new(RetryPolicy::default()));
    let query = build_query(
        &[QueryGroup::And(vec!["pathology".into(), "deep learning".into()])],
        &["cs.CV".into()],
        0,
    );

    let run = assert_ok!(client.fetch(&query, 5).await);

    println!("Found {} papers", run.records.len());
    for record in &run.records {
        println!("\n---");
        println!("Id: {}", record.id);
        println!("Title: {}", record.title);
        println!("Published: {}", record.published);
    }

    assert!(!run.records.is_empty(), "Should find at least one paper");
    assert!(run.records.len() <= 5);
}
