//! End-to-end tests for the M365 family service endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcpbridge_core::EnvFile;
use mcpbridge_m365::{AppState, router};

fn env_with(dir: &TempDir, pairs: &[(&str, &str)]) -> EnvFile {
    let env = EnvFile::new(dir.path().join(".env"));
    let map: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    env.update(&map).unwrap();
    env
}

async fn spawn(env: EnvFile, remote_base: &str) -> String {
    let state = Arc::new(AppState::with_endpoints(env, remote_base, remote_base).unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/tenant/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn health_reports_configured_flag() {
    let dir = TempDir::new().unwrap();
    let base = spawn(env_with(&dir, &[]), "http://unused.invalid").await;

    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["config"]["configured"], false);

    let dir2 = TempDir::new().unwrap();
    let env = env_with(
        &dir2,
        &[
            ("M365_TENANT_ID", "tenant"),
            ("M365_CLIENT_ID", "client"),
            ("M365_CLIENT_SECRET", "secret"),
        ],
    );
    let base = spawn(env, "http://unused.invalid").await;

    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["config"]["configured"], true);
    assert_eq!(body["config"]["tenant_id"], "tenant");
}

#[tokio::test]
async fn config_update_merges_and_preserves_existing_keys() {
    let dir = TempDir::new().unwrap();
    let env = env_with(&dir, &[("M365_CLIENT_ID", "client")]);
    let base = spawn(env, "http://unused.invalid").await;
    let client = reqwest::Client::new();

    let response = client
        .put(format!("{base}/api/mcp/config"))
        .json(&json!({"config": {"M365_TENANT_ID": "x"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let ack: Value = response.json().await.unwrap();
    assert_eq!(ack["success"], true);

    let body: Value = client
        .get(format!("{base}/api/mcp/config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["config"]["M365_TENANT_ID"], "x");
    assert_eq!(body["config"]["M365_CLIENT_ID"], "client");
}

#[tokio::test]
async fn concurrent_config_reads_never_observe_a_partial_map() {
    let dir = TempDir::new().unwrap();
    let env = env_with(
        &dir,
        &[("M365_TENANT_ID", "t1"), ("M365_CLIENT_ID", "c1")],
    );
    let base = spawn(env, "http://unused.invalid").await;
    let client = reqwest::Client::new();

    let writer = {
        let client = client.clone();
        let base = base.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                let (tenant, id) = if i % 2 == 0 { ("t2", "c2") } else { ("t1", "c1") };
                client
                    .put(format!("{base}/api/mcp/config"))
                    .json(&json!({"config": {
                        "M365_TENANT_ID": tenant,
                        "M365_CLIENT_ID": id
                    }}))
                    .send()
                    .await
                    .unwrap();
            }
        })
    };

    // Each update rewrites both keys under one write lock, so a locked
    // reader must see one complete pair, never an empty or mixed map.
    for _ in 0..50 {
        let body: Value = client
            .get(format!("{base}/api/mcp/config"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let tenant = body["config"]["M365_TENANT_ID"].as_str().unwrap_or("");
        let id = body["config"]["M365_CLIENT_ID"].as_str().unwrap_or("");
        assert!(
            (tenant, id) == ("t1", "c1") || (tenant, id) == ("t2", "c2"),
            "partial config observed: {:?}",
            body["config"]
        );
    }
    writer.await.unwrap();
}

#[tokio::test]
async fn config_update_reseeds_the_client_identity() {
    let dir = TempDir::new().unwrap();
    let env = env_with(&dir, &[("M365_TENANT_ID", "before")]);
    let base = spawn(env, "http://unused.invalid").await;
    let client = reqwest::Client::new();

    client
        .put(format!("{base}/api/mcp/config"))
        .json(&json!({"config": {"M365_TENANT_ID": "after"}}))
        .send()
        .await
        .unwrap();

    let body: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["config"]["tenant_id"], "after");
}

#[tokio::test]
async fn reset_for_unknown_user_returns_404_naming_the_email() {
    let remote = MockServer::start().await;
    mount_token_endpoint(&remote).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(&remote)
        .await;

    let dir = TempDir::new().unwrap();
    let env = env_with(
        &dir,
        &[
            ("M365_TENANT_ID", "tenant"),
            ("M365_CLIENT_ID", "client"),
            ("M365_CLIENT_SECRET", "secret"),
        ],
    );
    let base = spawn(env, &remote.uri()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/mcp/family/password/reset"))
        .json(&json!({
            "user_email": "nobody@example.com",
            "new_password": "N3w-Passw0rd"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert!(
        body["detail"]
            .as_str()
            .unwrap()
            .contains("nobody@example.com")
    );
}

#[tokio::test]
async fn reset_for_known_user_succeeds() {
    let remote = MockServer::start().await;
    mount_token_endpoint(&remote).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "user-1", "displayName": "Jane Smith"}]
        })))
        .mount(&remote)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v1.0/users/user-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&remote)
        .await;

    let dir = TempDir::new().unwrap();
    let env = env_with(
        &dir,
        &[
            ("M365_TENANT_ID", "tenant"),
            ("M365_CLIENT_ID", "client"),
            ("M365_CLIENT_SECRET", "secret"),
        ],
    );
    let base = spawn(env, &remote.uri()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/mcp/family/password/reset"))
        .json(&json!({
            "user_email": "jane.smith@example.com",
            "new_password": "N3w-Passw0rd",
            "force_change": false
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Password reset successful");
}

#[tokio::test]
async fn malformed_email_is_rejected_before_any_outbound_call() {
    let dir = TempDir::new().unwrap();
    let env = env_with(
        &dir,
        &[
            ("M365_TENANT_ID", "tenant"),
            ("M365_CLIENT_ID", "client"),
            ("M365_CLIENT_SECRET", "secret"),
        ],
    );
    let base = spawn(env, "http://unused.invalid").await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/mcp/family/password/reset"))
        .json(&json!({
            "user_email": "not-an-email",
            "new_password": "pw"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn activities_are_sorted_newest_first() {
    let dir = TempDir::new().unwrap();
    let base = spawn(env_with(&dir, &[]), "http://unused.invalid").await;

    let body: Vec<Value> = reqwest::get(format!("{base}/api/mcp/family/activities"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body.len(), 3);
    let timestamps: Vec<&str> = body
        .iter()
        .map(|a| a["timestamp"].as_str().unwrap())
        .collect();
    let mut sorted = timestamps.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(timestamps, sorted);
}
