//! End-to-end lookups against a mocked PassiveTotal API

use std::sync::Arc;

use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ptintel::gateway::endpoints;
use ptintel::{
    ClientSettings, Enricher, Entity, Error, Options, PassiveTotalClient, SearchLimitSignal,
};

fn enricher() -> Enricher {
    let client = assert_ok!(PassiveTotalClient::new(&ClientSettings::default()));
    Enricher::new(Arc::new(client))
}

fn options(server: &MockServer) -> Options {
    Options {
        host: server.uri(),
        user: "test".to_string(),
        api_key: "12345".to_string(),
        ..Options::default()
    }
}

async fn card_status(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(endpoints::CARD_SUMMARY))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_gateway_errors_become_volatile_timeouts() {
    for status in [500, 502, 504] {
        let server = card_status(status).await;
        let entities = vec![Entity::domain("example.com"), Entity::ipv4("8.8.8.8")];

        let results = assert_ok!(enricher().do_lookup(&entities, &options(&server)).await);

        assert_eq!(results.len(), 2, "status {}", status);
        for result in &results {
            assert!(result.is_volatile(), "status {}", status);
            assert_eq!(
                result.search_limit_signal(),
                Some(&SearchLimitSignal::gateway_timeout()),
                "status {}",
                status
            );
        }
    }
}

#[tokio::test]
async fn test_throttled_key_reports_api_key_limit() {
    let server = card_status(429).await;

    let results = assert_ok!(
        enricher()
            .do_lookup(&[Entity::domain("example.com")], &options(&server))
            .await
    );

    let signal = results[0].search_limit_signal().unwrap();
    assert!(signal.api_key_limit_reached);
    assert!(!signal.is_gateway_timeout);
}

#[tokio::test]
async fn test_bad_credentials_fail_the_batch() {
    let server = card_status(401).await;

    let error = enricher()
        .do_lookup(&[Entity::domain("example.com")], &options(&server))
        .await
        .unwrap_err();

    match error {
        Error::Batch(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].status_code(), Some(401));
            assert_eq!(errors[0].entity.value, "example.com");
        }
        other => panic!("expected a batch error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_card_summary_hit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(endpoints::CARD_SUMMARY))
        .and(query_param("query", "example.com"))
        .and(header("Authorization", "Basic dGVzdDoxMjM0NQ=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "example.com",
            "data_summary": {
                "resolutions": { "count": 3 },
                "certificates": { "count": 0 },
                "hashes": { "count": 0 },
                "projects": { "count": 0 },
                "articles": { "count": 0 },
                "trackers": { "count": 0 },
                "components": { "count": 0 },
                "host_pairs": { "count": 0 },
                "cookies": { "count": 0 }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let results = assert_ok!(
        enricher()
            .do_lookup(&[Entity::domain("example.com")], &options(&server))
            .await
    );

    assert_eq!(results.len(), 1);
    assert!(!results[0].is_volatile());
    let summary = &results[0].data.as_ref().unwrap().summary;
    assert!(summary[0].starts_with("Resolutions: 3"));
}

#[tokio::test]
async fn test_blocklisted_entities_never_reach_the_vendor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let options = Options {
        blocklist: ["example.com".to_string()].into_iter().collect(),
        ip_blocklist_regex: r"^8\.8\.".to_string(),
        ..options(&server)
    };
    let entities = vec![Entity::domain("EXAMPLE.com"), Entity::ipv4("8.8.8.8")];

    let results = assert_ok!(enricher().do_lookup(&entities, &options).await);
    assert!(results.is_empty());
}
