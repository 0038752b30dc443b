// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Transport and resource-layer tests against a mock backend.

use httpmock::prelude::*;
use serde_json::json;

use leonard_client::api::{ApiClient, ApiError};
use leonard_client::config::ClientConfig;
use leonard_client::resources::ResourceStore;

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(&ClientConfig::with_base_url(server.base_url()))
}

#[tokio::test]
async fn health_round_trip() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"status": "ok", "version": "0.3.0"}));
        })
        .await;

    let client = client_for(&server);
    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, "0.3.0");
    assert!(client.monitor().is_reachable());
    mock.assert_async().await;
}

#[tokio::test]
async fn closed_port_classifies_as_unreachable() {
    // Bind a listener, take its port, then drop it so nothing is listening.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = ApiClient::new(&ClientConfig::with_base_url(format!(
        "http://127.0.0.1:{}",
        port
    )));
    let err = client.health().await.unwrap_err();
    assert!(matches!(err, ApiError::BackendUnreachable(_)));
    assert!(!client.monitor().is_reachable());
}

#[tokio::test]
async fn server_error_carries_detail_and_keeps_reachable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/models/download/missing/status");
            then.status(404)
                .header("content-type", "application/json")
                .json_body(json!({"detail": "Download not found"}));
        })
        .await;

    let client = client_for(&server);
    let err = client.download_status("missing").await.unwrap_err();
    match err {
        ApiError::ServerError { status, detail } => {
            assert_eq!(status, 404);
            assert_eq!(detail, "Download not found");
        }
        other => panic!("expected ServerError, got {:?}", other),
    }
    // An HTTP error still proves the service is up.
    assert!(client.monitor().is_reachable());
}

#[tokio::test]
async fn refresh_all_isolates_a_failing_fetch() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/models");
            then.status(200).json_body(json!({"models": [{
                "id": "llama-q4",
                "name": "Llama Q4",
                "repo_id": "acme/llama-gguf",
                "filename": "llama-q4.gguf",
                "role": "general",
                "is_downloaded": true
            }]}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/tools");
            then.status(500)
                .json_body(json!({"detail": "tool registry exploded"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/skills");
            then.status(200).json_body(json!([{
                "id": "summarize",
                "name": "Summarize",
                "description": "Summarize text",
                "active": true
            }]));
        })
        .await;

    let store = ResourceStore::new(client_for(&server));
    store.refresh_all().await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.models.len(), 1);
    assert_eq!(snapshot.skills.len(), 1);
    assert!(snapshot.tools.is_empty());
    assert!(!snapshot.loading);
    assert!(matches!(
        snapshot.last_error,
        Some(ApiError::ServerError { status: 500, .. })
    ));
}

#[tokio::test]
async fn model_fetch_is_full_replacement() {
    let server = MockServer::start_async().await;
    let record = |id: &str| {
        json!({
            "id": id,
            "name": id,
            "repo_id": "acme/models",
            "filename": format!("{}.gguf", id),
            "role": "general",
            "is_downloaded": false
        })
    };

    let first = server
        .mock_async(|when, then| {
            when.method(GET).path("/models");
            then.status(200)
                .json_body(json!({"models": [record("a"), record("b")]}));
        })
        .await;

    let store = ResourceStore::new(client_for(&server));
    store.refresh_models().await.unwrap();
    assert_eq!(store.models().len(), 2);

    // Second fetch returns a different set; nothing from the first survives.
    first.delete_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/models");
            then.status(200).json_body(json!({"models": [record("c")]}));
        })
        .await;

    store.refresh_models().await.unwrap();
    let models = store.models();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].id, "c");
}

#[tokio::test]
async fn tool_toggle_failure_leaves_local_state_unchanged() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/tools");
            then.status(200).json_body(json!([{
                "id": "web_search",
                "name": "Web Search",
                "description": "Search the web",
                "enabled": false
            }]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/tools/web_search");
            then.status(500).json_body(json!({"detail": "registry write failed"}));
        })
        .await;

    let store = ResourceStore::new(client_for(&server));
    store.refresh_tools().await.unwrap();

    let result = store.set_tool_enabled("web_search", true).await;
    assert!(result.is_err());
    assert!(!store.tools()[0].enabled);
}

#[tokio::test]
async fn tool_toggle_success_updates_local_state() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/tools");
            then.status(200).json_body(json!([{
                "id": "web_search",
                "name": "Web Search",
                "enabled": false
            }]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/tools/web_search")
                .json_body(json!({"enabled": true}));
            then.status(200).json_body(json!({"success": true}));
        })
        .await;

    let store = ResourceStore::new(client_for(&server));
    store.refresh_tools().await.unwrap();
    store.set_tool_enabled("web_search", true).await.unwrap();
    assert!(store.tools()[0].enabled);
}

#[tokio::test]
async fn featured_lookup_stops_at_five_distinct_repos() {
    let server = MockServer::start_async().await;
    let hit = |repo: &str| json!({"repo_id": repo, "name": repo});

    // First seed returns three distinct repos plus a duplicate, second seed
    // completes the set. Later seeds must never be queried.
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/models/search")
                .query_param("q", "llama gguf");
            then.status(200).json_body(
                json!({"models": [hit("a/1"), hit("a/2"), hit("a/1"), hit("a/3")]}),
            );
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/models/search")
                .query_param("q", "qwen gguf");
            then.status(200)
                .json_body(json!({"models": [hit("b/1"), hit("b/2"), hit("b/3")]}));
        })
        .await;
    let later_seed = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/models/search")
                .query_param("q", "mistral gguf");
            then.status(200).json_body(json!({"models": []}));
        })
        .await;

    let store = ResourceStore::new(client_for(&server));
    let featured = store.load_featured().await;
    assert_eq!(featured.len(), 5);
    assert_eq!(later_seed.hits_async().await, 0);

    // Idempotent: the second call serves the cached list.
    let again = store.load_featured().await;
    assert_eq!(again.len(), 5);
}

#[tokio::test]
async fn featured_lookup_skips_failing_seeds() {
    let server = MockServer::start_async().await;
    let hit = |repo: &str| json!({"repo_id": repo, "name": repo});

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/models/search")
                .query_param("q", "llama gguf");
            then.status(502).json_body(json!({"detail": "hub unavailable"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/models/search");
            then.status(200).json_body(json!({"models": [hit("x/1")]}));
        })
        .await;

    let store = ResourceStore::new(client_for(&server));
    let featured = store.load_featured().await;
    // The failing seed contributed nothing but did not abort the pass.
    assert_eq!(featured.len(), 1);
}

#[tokio::test]
async fn remove_model_requires_server_confirmation() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/models");
            then.status(200).json_body(json!({"models": [{
                "id": "doomed",
                "name": "Doomed",
                "repo_id": "acme/doomed",
                "filename": "doomed.gguf",
                "role": "general",
                "is_downloaded": true
            }]}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/models/doomed");
            then.status(409).json_body(json!({"detail": "model is in use"}));
        })
        .await;

    let store = ResourceStore::new(client_for(&server));
    store.refresh_models().await.unwrap();

    assert!(store.remove_model("doomed").await.is_err());
    // Rejected server-side, so the record stays.
    assert_eq!(store.models().len(), 1);
}

#[tokio::test]
async fn chat_tools_toggle_returns_confirmed_state() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/tools/toggle")
                .json_body(json!({"enabled": false}));
            then.status(200).json_body(json!({"success": true, "enabled": false}));
        })
        .await;

    let store = ResourceStore::new(client_for(&server));
    let enabled = store.set_chat_tools_enabled(false).await.unwrap();
    assert!(!enabled);
}

#[tokio::test]
async fn bare_array_endpoints_decode() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/skills");
            then.status(200).json_body(json!([
                {"id": "s1", "name": "One", "active": true},
                {"id": "s2", "name": "Two", "active": false}
            ]));
        })
        .await;

    let client = client_for(&server);
    let skills = client.list_skills().await.unwrap();
    assert_eq!(skills.len(), 2);
    assert!(skills[0].active);
}
