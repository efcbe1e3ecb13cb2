//! arXiv adapter against a local mock of the export API.

use std::time::Duration;

use pretty_assertions::assert_eq;
use rxdigest_ingestion::query::{build_query, QueryGroup};
use rxdigest_ingestion::retry::RetryPolicy;
use rxdigest_ingestion::sources::arxiv::ArxivClient;
use rxdigest_ingestion::sources::LiteratureSource;
use rxdigest_test_utils::{arxiv_feed, ids};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, page_size: usize, retry: RetryPolicy) -> ArxivClient {
    ArxivClient::new(retry)
        .unwrap()
        .with_base_url(format!("{}/api/query", server.uri()))
        .with_page_size(page_size)
        .with_page_delay(Duration::ZERO)
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(1, Duration::from_millis(10))
}

#[tokio::test]
async fn test_pages_until_reported_total() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("search_query", "(cat:cs.CV) AND all:pathology"))
        .and(query_param("start", "0"))
        .and(query_param("max_results", "2"))
        .and(query_param("sortBy", "submittedDate"))
        .and(query_param("sortOrder", "descending"))
        .respond_with(ResponseTemplate::new(200).set_body_string(arxiv_feed(
            3,
            &[("2403.00001", "Pathology one"), ("2403.00002", "Pathology two")],
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(arxiv_feed(
            3,
            &[("2403.00002", "Pathology two"), ("2403.00003", "Pathology three")],
        )))
        .expect(1)
        .mount(&server)
        .await;

    let query = build_query(&[QueryGroup::Or(vec!["pathology".into()])], &["cs.CV".into()], 0);
    let run = client(&server, 2, fast_retry()).fetch(&query, 10).await.unwrap();

    // The overlapping entry on page two is emitted once.
    assert_eq!(
        ids(&run.records),
        vec!["arxiv_2403.00001", "arxiv_2403.00002", "arxiv_2403.00003"]
    );
    assert_eq!(run.report.duplicates, 1);
    assert_eq!(run.report.pages, 2);
    assert!(run.report.error.is_none());
}

#[tokio::test]
async fn test_empty_page_below_total_is_retried_then_ends() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(arxiv_feed(50, &[("2403.00001", "Only")])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("start", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(arxiv_feed(50, &[])))
        .expect(2)
        .mount(&server)
        .await;

    let query = build_query(&[], &[], 0);
    let run = client(&server, 1, fast_retry()).fetch(&query, 10).await.unwrap();

    assert_eq!(ids(&run.records), vec!["arxiv_2403.00001"]);
    assert!(run.report.error.is_none());
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(arxiv_feed(1, &[("2403.00009", "Recovered")])))
        .mount(&server)
        .await;

    let query = build_query(&[], &[], 0);
    let run = client(&server, 10, fast_retry()).fetch(&query, 10).await.unwrap();
    assert_eq!(ids(&run.records), vec!["arxiv_2403.00009"]);
}

#[tokio::test]
async fn test_persistent_failure_keeps_earlier_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(arxiv_feed(
            10,
            &[("2403.00001", "A"), ("2403.00002", "B")],
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let query = build_query(&[], &[], 0);
    let run = client(&server, 2, fast_retry()).fetch(&query, 10).await.unwrap();

    assert_eq!(ids(&run.records), vec!["arxiv_2403.00001", "arxiv_2403.00002"]);
    assert!(run.report.error.as_deref().unwrap_or_default().contains("500"));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let query = build_query(&[], &[], 0);
    let run = client(&server, 10, RetryPolicy::new(3, Duration::from_millis(10)))
        .fetch(&query, 10)
        .await
        .unwrap();
    assert!(run.records.is_empty());
    assert!(run.report.error.is_some());
}

#[tokio::test]
async fn test_fetch_by_id_uses_id_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("id_list", "2403.00042"))
        .respond_with(ResponseTemplate::new(200).set_body_string(arxiv_feed(1, &[("2403.00042", "By id")])))
        .mount(&server)
        .await;

    let record = client(&server, 10, fast_retry()).fetch_by_id("2403.00042").await.unwrap().unwrap();
    assert_eq!(record.id, "arxiv_2403.00042");
    assert_eq!(record.title, "By id");
}
