use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;
use usage_insights::config::Config;
use usage_insights::error::InsightError;
use usage_insights::metadata::shared_cache;
use usage_insights::service::InsightsService;

fn config_for(dir: &TempDir, ttl_secs: &str) -> Config {
    let workspaces = dir.path().join("workspaces.json");
    let context = dir.path().join("context.txt");
    fs::write(
        &workspaces,
        r#"{"Finance": {"workspace_id": "ws-fin", "dataset_id": "ds-fin"}}"#,
    )
    .unwrap();
    fs::write(&context, "Usage Metrics model").unwrap();

    let vars: HashMap<&str, String> = [
        ("AZURE_TENANT_ID", "tenant".to_string()),
        ("AZURE_CLIENT_ID", "client".to_string()),
        ("AZURE_CLIENT_SECRET", "secret".to_string()),
        ("OPENAI_API_KEY", "sk-test".to_string()),
        ("REFERENCE_TTL_SECS", ttl_secs.to_string()),
        ("WORKSPACES_FILE", workspaces.display().to_string()),
        ("CONTEXT_FILE", context.display().to_string()),
    ]
    .into_iter()
    .collect();
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

#[test]
fn explicit_reload_picks_up_catalogue_changes() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir, "3600");
    let service = InsightsService::from_config(&config).unwrap();
    assert_eq!(service.workspace_names().unwrap(), vec!["Finance"]);

    fs::write(
        &config.workspaces_file,
        r#"{
            "Finance": {"workspace_id": "ws-fin", "dataset_id": "ds-fin"},
            "Sales": {"workspace_id": "ws-sales", "dataset_id": "ds-sales"}
        }"#,
    )
    .unwrap();

    // Still within the TTL, so the cached catalogue is served
    assert_eq!(service.workspace_names().unwrap(), vec!["Finance"]);

    service.reload_reference().unwrap();
    assert_eq!(service.workspace_names().unwrap(), vec!["Finance", "Sales"]);
}

#[test]
fn failed_reload_is_metadata_error() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir, "3600");
    let service = InsightsService::from_config(&config).unwrap();

    fs::write(&config.workspaces_file, "not json").unwrap();
    assert!(matches!(
        service.reload_reference(),
        Err(InsightError::Metadata(_))
    ));
}

#[tokio::test]
async fn unknown_workspace_fails_before_any_run() {
    let dir = TempDir::new().unwrap();
    let service = InsightsService::from_config(&config_for(&dir, "3600")).unwrap();

    match service.ask("HR", "How many views?", None).await {
        Err(InsightError::Metadata(message)) => assert!(message.contains("Finance")),
        other => panic!("expected metadata error, got {:?}", other.map(|r| r.to_string())),
    }
}

#[tokio::test]
async fn blank_question_is_rejected() {
    let dir = TempDir::new().unwrap();
    let service = InsightsService::from_config(&config_for(&dir, "3600")).unwrap();

    assert!(matches!(
        service.ask("Finance", "   ", None).await,
        Err(InsightError::Validation(_))
    ));
}

#[test]
fn missing_credentials_block_service_construction() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for(&dir, "3600");
    config.openai_api_key.clear();
    assert!(matches!(
        InsightsService::from_config(&config),
        Err(InsightError::Config(_))
    ));
}

#[test]
fn catalogue_is_readable_without_credentials() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for(&dir, "3600");
    config.client_secret.clear();
    config.openai_api_key.clear();
    assert!(config.validate().is_err());

    let cache = shared_cache(&config.reference_source(), config.reference_ttl);
    assert_eq!(cache.reload().unwrap().workspace_names(), vec!["Finance"]);
}
