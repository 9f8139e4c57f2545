use serde_json::json;
use std::time::Duration;
use usage_insights::auth::{AzureAdTokenProvider, TokenProvider};
use usage_insights::error::InsightError;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> AzureAdTokenProvider {
    AzureAdTokenProvider::new(
        server.uri(),
        "tenant-1",
        "client-1",
        "secret&value",
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn client_credential_request_yields_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-1"))
        .and(body_string_contains("client_secret=secret%26value"))
        .and(body_string_contains(
            "scope=https%3A%2F%2Fanalysis.windows.net%2Fpowerbi%2Fapi%2F.default",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "eyJ0eXAiOiJKV1Qi"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credential = provider(&server).acquire().await.unwrap();
    assert_eq!(credential.token(), "eyJ0eXAiOiJKV1Qi");
    assert!(credential.expires_at() > chrono::Utc::now());
}

#[tokio::test]
async fn cached_token_is_reused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "expires_in": 3599,
            "access_token": "cached-token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    let first = provider.acquire().await.unwrap();
    let second = provider.acquire().await.unwrap();
    assert_eq!(first.token(), second.token());
}

#[tokio::test]
async fn rejected_request_surfaces_error_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(&server)
        .await;

    match provider(&server).acquire().await {
        Err(InsightError::Auth(message)) => {
            assert!(message.contains("AADSTS7000215"));
            assert!(message.contains("401"));
        }
        other => panic!("expected auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_identity_provider_is_auth_error() {
    let provider = AzureAdTokenProvider::new(
        "http://127.0.0.1:1",
        "tenant-1",
        "client-1",
        "secret",
        Duration::from_secs(2),
    )
    .unwrap();

    assert!(matches!(provider.acquire().await, Err(InsightError::Auth(_))));
}
