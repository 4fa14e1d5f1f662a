use serde_json::json;
use siem_log_forwarder::domain::Severity;
use siem_log_forwarder::source::{JiraConfig, JiraSource, LogSource, SourceError};
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

const AUDIT_PATH: &str = "/rest/api/3/auditing/record";

fn audit_record(id: u64, category: &str) -> serde_json::Value {
    json!({
        "id": id,
        "summary": format!("audit event {id}"),
        "created": "2024-05-01T12:00:00.000+0000",
        "category": category,
        "remoteAddress": "10.0.0.1",
        "authorAccountId": "acc-1",
        "objectItem": {"name": "jira-software-users"}
    })
}

fn source(server: &MockServer) -> JiraSource {
    let mut config = JiraConfig::new(server.uri(), "u", "p");
    config.request_timeout = Duration::from_secs(5);
    config.retry_base_delay = Duration::from_millis(10);
    JiraSource::new(config).unwrap()
}

#[tokio::test]
async fn test_jira_paginates_by_offset_until_total() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(AUDIT_PATH))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "1000"))
        .and(header("authorization", "Basic dTpw"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "offset": 0,
            "limit": 1000,
            "total": 3,
            "records": [audit_record(1, "SECURITY"), audit_record(2, "ADMIN")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(AUDIT_PATH))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "offset": 2,
            "limit": 1000,
            "total": 3,
            "records": [audit_record(3, "user management")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut jira = source(&server);
    let records = jira.poll().await.unwrap();

    assert_eq!(records.len(), 3);
    let severities: Vec<Severity> = records.iter().map(|r| r.severity()).collect();
    assert_eq!(
        severities,
        vec![Severity::Critical, Severity::Warning, Severity::Info]
    );
    assert_eq!(records[0].source(), "jira");
    assert_eq!(records[0].event_id(), Some("1"));
    assert_eq!(records[0].field("user"), Some("acc-1"));
    assert_eq!(records[0].field("ip_address"), Some("10.0.0.1"));
    assert_eq!(records[0].field("object"), Some("jira-software-users"));
    assert!(jira.last_fetch().is_some());
}

#[tokio::test]
async fn test_jira_follows_next_page_links() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(AUDIT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [audit_record(1, "SECURITY")],
            "nextPage": format!("{}/audit/cursor/abc", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/audit/cursor/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [audit_record(2, "SECURITY")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = source(&server).poll().await.unwrap();
    let ids: Vec<Option<&str>> = records.iter().map(|r| r.event_id()).collect();
    assert_eq!(ids, vec![Some("1"), Some("2")]);
}

#[tokio::test]
async fn test_jira_retries_after_rate_limit() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(AUDIT_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(AUDIT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "records": [audit_record(7, "ADMIN")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = source(&server).poll().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_id(), Some("7"));
}

#[tokio::test]
async fn test_jira_gives_up_when_rate_limit_persists() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(AUDIT_PATH))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-RateLimit-Remaining", "0")
                .insert_header("Retry-After", "0"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let mut config = JiraConfig::new(server.uri(), "u", "p");
    config.max_retries = 1;
    let mut jira = JiraSource::new(config).unwrap();

    let result = jira.poll().await;
    assert!(matches!(result, Err(SourceError::RateLimited(1))));
    assert!(jira.last_fetch().is_none());
}

#[tokio::test]
async fn test_jira_oversized_retry_after_is_capped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(AUDIT_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1e30"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(AUDIT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "records": [audit_record(7, "SECURITY")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = JiraConfig::new(server.uri(), "u", "p");
    config.request_timeout = Duration::from_secs(5);
    config.max_retry_wait = Duration::from_millis(10);
    let mut jira = JiraSource::new(config).unwrap();

    let records = tokio::time::timeout(Duration::from_secs(5), jira.poll())
        .await
        .expect("rate-limit wait should be capped")
        .unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_jira_server_error_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(AUDIT_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    match source(&server).poll().await {
        Err(SourceError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "Internal Server Error");
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_jira_next_window_starts_where_last_one_ended() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(AUDIT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "records": [audit_record(1, "SECURITY")]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let mut jira = source(&server);
    jira.poll().await.unwrap();
    let first_end = jira.last_fetch().unwrap();
    jira.poll().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let param = |index: usize, name: &str| -> String {
        requests[index]
            .url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .unwrap()
    };
    assert_eq!(param(1, "from"), param(0, "to"));
    assert_eq!(param(1, "from"), first_end.to_rfc3339());
}

#[tokio::test]
async fn test_jira_empty_poll_keeps_window_start() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(AUDIT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 0,
            "records": []
        })))
        .mount(&server)
        .await;

    let mut jira = source(&server);
    assert!(jira.poll().await.unwrap().is_empty());
    assert!(jira.last_fetch().is_none());
}
