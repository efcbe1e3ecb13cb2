//! bioRxiv / medRxiv adapter and manual links against a local mock API.

use std::time::Duration;

use pretty_assertions::assert_eq;
use rxdigest_ingestion::query::{build_query, QueryGroup};
use rxdigest_ingestion::retry::RetryPolicy;
use rxdigest_ingestion::sources::arxiv::ArxivClient;
use rxdigest_ingestion::sources::biorxiv::BioRxivClient;
use rxdigest_ingestion::sources::manual::ManualLinks;
use rxdigest_ingestion::sources::LiteratureSource;
use rxdigest_ingestion::RecordSource;
use rxdigest_test_utils::{arxiv_feed, details_body, ids};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(1, Duration::from_millis(10))
}

fn medrxiv(server: &MockServer) -> BioRxivClient {
    BioRxivClient::new_medrxiv(fast_retry()).unwrap().with_base_url(server.uri())
}

#[tokio::test]
async fn test_walks_cursor_and_prefilters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/details/medrxiv/2019-06-01/\d{4}-\d{2}-\d{2}/0$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(details_body(
            3,
            &[
                ("10.1101/2024.03.01.1", "Digital pathology cohort"),
                ("10.1101/2024.03.01.2", "Vaccine uptake survey"),
            ],
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/details/medrxiv/2019-06-01/\d{4}-\d{2}-\d{2}/2$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(details_body(
            3,
            &[("10.1101/2024.03.01.3", "Pathology reports")],
        )))
        .expect(1)
        .mount(&server)
        .await;

    let query = build_query(&[QueryGroup::Or(vec!["pathology".into()])], &[], 0);
    let run = medrxiv(&server).fetch(&query, 10).await.unwrap();

    assert_eq!(
        ids(&run.records),
        vec!["medrxiv_10_1101_2024_03_01_1", "medrxiv_10_1101_2024_03_01_3"]
    );
    assert!(run.records.iter().all(|r| r.source == RecordSource::MedRxiv));
    assert_eq!(run.records[0].authors, vec!["Doe, J.", "Roe, R."]);
}

#[tokio::test]
async fn test_not_ok_status_ends_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"messages":[{"status":"no posts found"}],"collection":[]}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let query = build_query(&[], &[], 3);
    let run = medrxiv(&server).fetch(&query, 10).await.unwrap();
    assert!(run.records.is_empty());
    assert!(run.report.error.is_none());
}

#[tokio::test]
async fn test_cap_applies_within_a_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(details_body(
            300,
            &[("10.1/a", "One"), ("10.1/b", "Two"), ("10.1/c", "Three")],
        )))
        .expect(1)
        .mount(&server)
        .await;

    let query = build_query(&[], &[], 0);
    let run = medrxiv(&server).fetch(&query, 2).await.unwrap();
    assert_eq!(ids(&run.records), vec!["medrxiv_10_1_a", "medrxiv_10_1_b"]);
}

#[tokio::test]
async fn test_invalid_json_counts_as_malformed_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"messages\": [tru"))
        .mount(&server)
        .await;

    let query = build_query(&[], &[], 0);
    let run = medrxiv(&server).fetch(&query, 10).await.unwrap();
    assert!(run.records.is_empty());
    assert_eq!(run.report.malformed_pages, 2);
}

#[tokio::test]
async fn test_bad_item_is_skipped_without_losing_the_page() {
    let server = MockServer::start().await;
    let body = r#"{
      "messages": [{"status": "ok", "cursor": 0, "count": 3, "total": 3}],
      "collection": [
        {"doi": "10.1101/2024.03.02.1", "title": "Slide-level pathology", "authors": "Doe, J.",
         "date": "2024-03-02", "version": "1", "category": "pathology", "abstract": "WSI."},
        {"doi": "10.1101/2024.03.02.2", "title": "Frozen section triage", "authors": "Roe, R.",
         "date": "2024-03-02", "version": 2, "category": "pathology", "abstract": null},
        {"doi": "10.1101/2024.03.02.3", "title": {"text": "Nested"}, "authors": "Poe, P.",
         "date": "2024-03-02", "version": "1", "category": "pathology", "abstract": ""}
      ]
    }"#;
    Mock::given(method("GET"))
        .and(path_regex(r"^/details/medrxiv/2019-06-01/\d{4}-\d{2}-\d{2}/0$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let query = build_query(&[], &[], 0);
    let run = medrxiv(&server).fetch(&query, 10).await.unwrap();

    assert_eq!(
        ids(&run.records),
        vec!["medrxiv_10_1101_2024_03_02_1", "medrxiv_10_1101_2024_03_02_2"]
    );
    assert_eq!(run.records[1].abstract_text, "");
    assert!(run.records[1].pdf_url.ends_with("2024.03.02.2v2.full.pdf"));
    assert_eq!(run.report.skipped, 1);
    assert_eq!(run.report.malformed_pages, 0);
    assert!(run.report.error.is_none());
}

#[tokio::test]
async fn test_manual_links_resolve_through_apis() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("id_list", "2403.00007"))
        .respond_with(ResponseTemplate::new(200).set_body_string(arxiv_feed(1, &[("2403.00007", "Linked arXiv paper")])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/details/medrxiv/10.1101/2024.03.01.24303333"))
        .respond_with(ResponseTemplate::new(200).set_body_string(details_body(
            1,
            &[("10.1101/2024.03.01.24303333", "Linked medRxiv paper")],
        )))
        .mount(&server)
        .await;

    let retry = fast_retry();
    let arxiv = ArxivClient::new(retry)
        .unwrap()
        .with_base_url(format!("{}/api/query", server.uri()))
        .with_page_delay(Duration::ZERO);
    let links = ManualLinks::new(
        vec![
            "https://arxiv.org/pdf/2403.00007.pdf".into(),
            "https://www.medrxiv.org/content/10.1101/2024.03.01.24303333v1.full.pdf".into(),
            "https://www.nature.com/articles/s41586-000-0000-0".into(),
        ],
        arxiv,
        BioRxivClient::new_biorxiv(retry).unwrap().with_base_url(server.uri()),
        medrxiv(&server),
        retry,
    );

    let query = build_query(&[], &[], 0);
    let run = links.fetch(&query, 10).await.unwrap();

    assert_eq!(
        ids(&run.records),
        vec!["manual_2403.00007.pdf", "manual_2024.03.01.24303333v1.full.pdf"]
    );
    assert!(run.records.iter().all(|r| r.source == RecordSource::Manual));
    assert_eq!(run.records[0].title, "Linked arXiv paper");
    assert_eq!(run.report.skipped, 1);
}
