use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use mkutils_presence::config::Config;
use mkutils_presence::relay::DispatchOptions;
use mkutils_presence::{
    AppState, Dispatcher, HostRole, KeySpace, PresenceDirectory, Relay, SidecarHost, create_app,
};
use mkutils_store::{ConnectionConfig, MemoryStore, StoreManager};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
// for `oneshot` method

/// One sidecar wired to a shared in-memory store
struct TestNode {
    app: axum::Router,
    manager: Arc<StoreManager>,
    host: Arc<SidecarHost>,
}

fn test_connection_config() -> ConnectionConfig {
    ConnectionConfig {
        is_enabled: true,
        sync_bungee_data_using_redis: true,
        liveness_interval: Duration::from_millis(10),
        backoff_max: Duration::from_millis(20),
        failure_threshold: 2,
        ..ConnectionConfig::default()
    }
}

/// Helper to create a sidecar with default test configuration
async fn setup_node(memory: &MemoryStore, role: HostRole, server_name: &str) -> TestNode {
    let manager = Arc::new(
        StoreManager::with_memory(test_connection_config(), memory.clone())
            .await
            .expect("Failed to initialize in-memory store"),
    );
    let keys = KeySpace::default();
    let store = manager.store();
    let directory = Arc::new(PresenceDirectory::new(store.clone(), keys.clone()));
    let host = Arc::new(SidecarHost::new(64));
    let owns_presence = role == HostRole::GameServer;
    if owns_presence {
        directory
            .announce_server_online(server_name)
            .await
            .expect("Failed to announce server");
    }

    let config = Config::default();
    let app = create_app(
        AppState {
            role,
            server_name: server_name.to_string(),
            owns_presence,
            manager: manager.clone(),
            directory,
            relay: Relay::new(store, keys),
            host: host.clone(),
        },
        config.request_body_limit,
        config.request_timeout,
    );

    TestNode { app, manager, host }
}

/// Helper to send a request and get response
async fn send_request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request_builder = Request::builder().uri(uri).method(method);

    let request = if let Some(json_body) = body {
        request_builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&json_body).unwrap()))
            .unwrap()
    } else {
        request_builder.body(Body::empty()).unwrap()
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();

    // Try to parse as JSON, or return empty object
    let json = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(json!({}))
    };

    (status, json)
}

/// Poll `/actions/pending` until something arrives or the timeout passes
async fn wait_for_pending(app: &axum::Router) -> Value {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let (_, body) = send_request(app.clone(), "GET", "/actions/pending", None).await;
            if body.as_array().is_some_and(|actions| !actions.is_empty()) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("no action reached the host")
}

// =============================================================================
// HEALTH AND STATUS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    // GIVEN: A sidecar over a reachable store
    let memory = MemoryStore::new();
    let node = setup_node(&memory, HostRole::GameServer, "lobby-1").await;

    // WHEN: Making a GET request to /health
    let (status, body) = send_request(node.app, "GET", "/health", None).await;

    // THEN: Should return 200 OK with the sync state
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sync"]["state"], "connected");
}

#[tokio::test]
async fn test_health_endpoint_reports_degraded_store() {
    // GIVEN: A sidecar whose store stops answering
    let memory = MemoryStore::new();
    let node = setup_node(&memory, HostRole::GameServer, "lobby-1").await;
    let liveness = node.manager.spawn_liveness();
    memory.set_available(false);
    let mut status = node.manager.watch_status();
    tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| !s.is_healthy()))
        .await
        .unwrap()
        .unwrap();

    // WHEN: Making a GET request to /health
    let (status, body) = send_request(node.app, "GET", "/health", None).await;

    // THEN: Should return 503 Service Unavailable
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");

    node.manager.shutdown().await;
    liveness.await.unwrap();
}

#[tokio::test]
async fn test_status_endpoint() {
    // GIVEN: A game server sidecar with one player
    let memory = MemoryStore::new();
    let node = setup_node(&memory, HostRole::GameServer, "lobby-1").await;
    send_request(
        node.app.clone(),
        "POST",
        "/join",
        Some(json!({ "player": "Steve" })),
    )
    .await;

    // WHEN: Making a GET request to /status
    let (status, body) = send_request(node.app, "GET", "/status", None).await;

    // THEN: Should describe the process
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "game_server");
    assert_eq!(body["server_name"], "lobby-1");
    assert_eq!(body["owns_presence"], true);
    assert_eq!(body["owned_servers"], json!(["lobby-1"]));
    assert_eq!(body["local_players"], 1);
    assert_eq!(body["pending_actions"], 0);
}

// =============================================================================
// PLAYER TRANSITIONS
// =============================================================================

#[tokio::test]
async fn test_join_publishes_presence() {
    // GIVEN: A game server sidecar
    let memory = MemoryStore::new();
    let node = setup_node(&memory, HostRole::GameServer, "lobby-1").await;

    // WHEN: Steve joins
    let (status, _) = send_request(
        node.app.clone(),
        "POST",
        "/join",
        Some(json!({ "player": "Steve" })),
    )
    .await;

    // THEN: The network sees Steve on lobby-1
    assert_eq!(status, StatusCode::OK);
    let (_, servers) = send_request(node.app.clone(), "GET", "/servers", None).await;
    assert_eq!(servers, json!({ "lobby-1": ["Steve"] }));
    let (status, location) = send_request(node.app.clone(), "GET", "/players/Steve", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(location, json!({ "player": "Steve", "server": "lobby-1" }));
    let (_, count) = send_request(node.app, "GET", "/count", None).await;
    assert_eq!(count, json!({ "global": 1, "servers": { "lobby-1": 1 } }));
}

#[tokio::test]
async fn test_leave_removes_presence() {
    // GIVEN: Steve is on lobby-1
    let memory = MemoryStore::new();
    let node = setup_node(&memory, HostRole::GameServer, "lobby-1").await;
    send_request(
        node.app.clone(),
        "POST",
        "/join",
        Some(json!({ "player": "Steve" })),
    )
    .await;

    // WHEN: Steve leaves, twice
    let (first, _) = send_request(
        node.app.clone(),
        "POST",
        "/leave",
        Some(json!({ "player": "Steve" })),
    )
    .await;
    let (second, _) = send_request(
        node.app.clone(),
        "POST",
        "/leave",
        Some(json!({ "player": "Steve" })),
    )
    .await;

    // THEN: Both succeed and Steve is offline
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    let (status, body) = send_request(node.app.clone(), "GET", "/players/Steve", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("Steve"));
    let (_, servers) = send_request(node.app, "GET", "/servers", None).await;
    assert_eq!(servers, json!({ "lobby-1": [] }));
}

#[tokio::test]
async fn test_sync_replaces_players() {
    // GIVEN: A game server with Notch recorded
    let memory = MemoryStore::new();
    let node = setup_node(&memory, HostRole::GameServer, "lobby-1").await;
    send_request(
        node.app.clone(),
        "POST",
        "/join",
        Some(json!({ "player": "Notch" })),
    )
    .await;

    // WHEN: The host reports its authoritative list
    let (status, _) = send_request(
        node.app.clone(),
        "POST",
        "/sync",
        Some(json!({ "players": ["Steve", "Alex"] })),
    )
    .await;

    // THEN: The entry matches the list exactly
    assert_eq!(status, StatusCode::OK);
    let (_, players) = send_request(node.app, "GET", "/players", None).await;
    assert_eq!(players, json!(["Alex", "Steve"]));
}

#[tokio::test]
async fn test_join_with_invalid_player_name() {
    // GIVEN: A game server sidecar
    let memory = MemoryStore::new();
    let node = setup_node(&memory, HostRole::GameServer, "lobby-1").await;

    // WHEN: Joining with a name that would corrupt the stored list
    let (status, body) = send_request(
        node.app.clone(),
        "POST",
        "/join",
        Some(json!({ "player": "Steve;Alex" })),
    )
    .await;

    // THEN: Should return 400 and record nothing
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid characters"));
    let (_, players) = send_request(node.app, "GET", "/players", None).await;
    assert_eq!(players, json!([]));
}

#[tokio::test]
async fn test_join_on_server_owned_elsewhere() {
    // GIVEN: A sidecar owning lobby-1 only
    let memory = MemoryStore::new();
    let node = setup_node(&memory, HostRole::GameServer, "lobby-1").await;

    // WHEN: Reporting a join on survival
    let (status, body) = send_request(
        node.app,
        "POST",
        "/join",
        Some(json!({ "player": "Steve", "server": "survival" })),
    )
    .await;

    // THEN: Should return 409 Conflict
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["details"], "survival");
}

#[tokio::test]
async fn test_proxy_join_only_records_local_player() {
    // GIVEN: A proxy sidecar
    let memory = MemoryStore::new();
    let node = setup_node(&memory, HostRole::Proxy, "proxy-1").await;

    // WHEN: Steve connects through the proxy
    let (status, _) = send_request(
        node.app.clone(),
        "POST",
        "/join",
        Some(json!({ "player": "Steve", "permissions": ["mkutils.staff"] })),
    )
    .await;

    // THEN: The proxy knows Steve but does not write presence
    assert_eq!(status, StatusCode::OK);
    assert_eq!(node.host.local_players().await.len(), 1);
    let (_, servers) = send_request(node.app, "GET", "/servers", None).await;
    assert_eq!(servers, json!({}));
}

// =============================================================================
// RELAY ACTIONS
// =============================================================================

#[tokio::test]
async fn test_kick_reaches_only_the_proxy_holding_the_player() {
    // GIVEN: Two proxies listening, Steve on proxy A
    let memory = MemoryStore::new();
    let game = setup_node(&memory, HostRole::GameServer, "lobby-1").await;
    let proxy_a = setup_node(&memory, HostRole::Proxy, "proxy-a").await;
    let proxy_b = setup_node(&memory, HostRole::Proxy, "proxy-b").await;
    send_request(
        proxy_a.app.clone(),
        "POST",
        "/join",
        Some(json!({ "player": "Steve" })),
    )
    .await;

    let cancel = CancellationToken::new();
    let mut listeners = Vec::new();
    for node in [&proxy_a, &proxy_b] {
        let dispatcher = Dispatcher::for_role(
            HostRole::Proxy,
            node.host.clone(),
            None,
            DispatchOptions::default(),
        );
        listeners.push(
            dispatcher
                .listen(node.manager.store(), cancel.clone())
                .await
                .unwrap(),
        );
    }

    // WHEN: The game server asks for Steve to be kicked
    let (status, body) = send_request(
        game.app,
        "POST",
        "/actions",
        Some(json!({ "action": "kick_player", "player": "Steve", "reason": "AFK" })),
    )
    .await;

    // THEN: Both proxies receive it, only proxy A acts
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["receivers"], 2);
    let pending = wait_for_pending(&proxy_a.app).await;
    assert_eq!(
        pending,
        json!([{ "action": "kick_player", "player": "Steve", "reason": "AFK", "bypass_permission": null }])
    );
    let (_, other) = send_request(proxy_b.app, "GET", "/actions/pending", None).await;
    assert_eq!(other, json!([]));

    cancel.cancel();
    for listener in listeners {
        listener.await.unwrap();
    }
}

#[tokio::test]
async fn test_publish_invalid_action() {
    // GIVEN: A game server sidecar
    let memory = MemoryStore::new();
    let node = setup_node(&memory, HostRole::GameServer, "lobby-1").await;

    // WHEN: Publishing a chat line containing the field separator
    let (status, body) = send_request(
        node.app,
        "POST",
        "/actions",
        Some(json!({ "action": "send_chat", "player": "Steve", "text": "a;b" })),
    )
    .await;

    // THEN: Should return 400 and publish nothing
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("';'"));
}

#[tokio::test]
async fn test_publish_presence_claim_is_rejected() {
    // GIVEN: A game server sidecar
    let memory = MemoryStore::new();
    let node = setup_node(&memory, HostRole::GameServer, "lobby-1").await;

    // WHEN: Trying to publish a directory-internal message
    let (status, _) = send_request(
        node.app,
        "POST",
        "/actions",
        Some(json!({
            "action": "presence_claim",
            "player": "Steve",
            "server": "lobby-1",
            "joined_at": 1_700_000_000_000i64
        })),
    )
    .await;

    // THEN: Should return 403 Forbidden
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_publish_unknown_action() {
    // GIVEN: A game server sidecar
    let memory = MemoryStore::new();
    let node = setup_node(&memory, HostRole::GameServer, "lobby-1").await;

    // WHEN: Publishing an action kind that does not exist
    let (status, _) = send_request(
        node.app,
        "POST",
        "/actions",
        Some(json!({ "action": "explode", "player": "Steve" })),
    )
    .await;

    // THEN: Should return 422 Unprocessable Entity
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
