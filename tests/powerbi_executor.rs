use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::time::Duration;
use usage_insights::auth::Credential;
use usage_insights::execution::engine::{ExecutionOutcome, QueryCandidate, QueryExecutor};
use usage_insights::execution::powerbi_engine::PowerBiExecutor;
use usage_insights::execution_loop::error_classifier::FailureKind;
use usage_insights::metadata::DatasetMetadata;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXECUTE_PATH: &str = "/groups/ws-usage/datasets/ds-usage/executeQueries";

fn credential() -> Credential {
    Credential::new("pbi-token", Utc::now() + ChronoDuration::hours(1))
}

fn metadata() -> DatasetMetadata {
    DatasetMetadata::new("ws-usage", "ds-usage")
}

fn candidate() -> QueryCandidate {
    QueryCandidate::new(1, "EVALUATE ROW(\"count\", COUNTROWS('Report views'))")
}

fn executor(server: &MockServer) -> PowerBiExecutor {
    PowerBiExecutor::new(server.uri(), Duration::from_secs(5)).unwrap()
}

async fn failure_kind(server: &MockServer) -> (FailureKind, String) {
    match executor(server).execute(&credential(), &metadata(), &candidate()).await {
        ExecutionOutcome::Failure(failure) => (failure.kind, failure.message),
        ExecutionOutcome::Success(payload) => panic!("expected failure, got {:?}", payload),
    }
}

#[tokio::test]
async fn sends_single_query_with_nulls_and_parses_rows() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EXECUTE_PATH))
        .and(header("Authorization", "Bearer pbi-token"))
        .and(body_json(json!({
            "queries": [{"query": "EVALUATE ROW(\"count\", COUNTROWS('Report views'))"}],
            "serializerSettings": {"includeNulls": true}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"tables": [{"rows": [{"[count]": 42, "[note]": null}]}]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = executor(&server)
        .execute(&credential(), &metadata(), &candidate())
        .await;

    match outcome {
        ExecutionOutcome::Success(payload) => {
            assert_eq!(payload.row_count(), 1);
            assert_eq!(payload.rows()[0]["[count]"], json!(42));
            assert!(payload.rows()[0]["[note]"].is_null());
        }
        ExecutionOutcome::Failure(failure) => panic!("unexpected failure: {}", failure),
    }
}

#[tokio::test]
async fn include_nulls_can_be_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EXECUTE_PATH))
        .and(body_json(json!({
            "queries": [{"query": "EVALUATE ROW(\"count\", COUNTROWS('Report views'))"}],
            "serializerSettings": {"includeNulls": false}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"tables": [{"rows": []}]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = executor(&server)
        .with_include_nulls(false)
        .execute(&credential(), &metadata(), &candidate())
        .await;
    assert!(outcome.is_success());
}

#[tokio::test]
async fn bad_request_is_invalid_query_with_engine_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EXECUTE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": "DatasetExecuteQueriesError",
                "pbi.error": {
                    "code": "DatasetExecuteQueriesError",
                    "details": [{
                        "code": "DetailsMessage",
                        "detail": {"type": 1, "value": "Query (1, 30) Cannot find table 'Report views'."}
                    }]
                }
            }
        })))
        .mount(&server)
        .await;

    let (kind, message) = failure_kind(&server).await;
    assert_eq!(kind, FailureKind::InvalidQuery);
    assert_eq!(message, "HTTP 400: Query (1, 30) Cannot find table 'Report views'.");
}

#[tokio::test]
async fn unauthorized_is_auth_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EXECUTE_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (kind, message) = failure_kind(&server).await;
    assert_eq!(kind, FailureKind::AuthRejected);
    assert_eq!(message, "HTTP 401: Unauthorized");
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EXECUTE_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("try again later"))
        .mount(&server)
        .await;

    let (kind, _) = failure_kind(&server).await;
    assert_eq!(kind, FailureKind::Transient);
}

#[tokio::test]
async fn slow_service_times_out_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EXECUTE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": [{"tables": [{"rows": []}]}]}))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let executor = PowerBiExecutor::new(server.uri(), Duration::from_millis(100)).unwrap();
    match executor.execute(&credential(), &metadata(), &candidate()).await {
        ExecutionOutcome::Failure(failure) => assert_eq!(failure.kind, FailureKind::Transient),
        ExecutionOutcome::Success(_) => panic!("expected timeout"),
    }
}

#[tokio::test]
async fn malformed_success_body_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EXECUTE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let (kind, message) = failure_kind(&server).await;
    assert_eq!(kind, FailureKind::Unknown);
    assert!(message.starts_with("Malformed executeQueries response"));
}

#[tokio::test]
async fn unreachable_service_is_transient() {
    let executor = PowerBiExecutor::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
    match executor.execute(&credential(), &metadata(), &candidate()).await {
        ExecutionOutcome::Failure(failure) => assert_eq!(failure.kind, FailureKind::Transient),
        ExecutionOutcome::Success(_) => panic!("expected connection failure"),
    }
}
