//! End-to-end tests driving the full router: Agent/Operator pairing,
//! admission races, the Permission Evaluator, and the Argument Sanitizer,
//! all through real websocket connections against an in-memory credential
//! store.

use std::time::Duration;

use axum_test::TestServer;
use http::StatusCode;
use serde_json::{json, Value};

use relay_broker::config::Config;
use relay_broker::state::AppState;
use relay_broker::store::InMemoryStore;

const ADMIN_USER: &str = "admin";
const ADMIN_PASS: &str = "admin-secret";

fn test_config() -> Config {
    Config {
        store_addr: "localhost:27017".to_string(),
        listen_port: 0,
        admin_username: ADMIN_USER.to_string(),
        admin_password_hash: relay_broker::config::hash_hex(ADMIN_PASS),
    }
}

fn setup() -> (TestServer, AppState) {
    let state = AppState::new(std::sync::Arc::new(InMemoryStore::new()), test_config());
    let app = relay_broker::build_router(state.clone());
    let server = TestServer::builder()
        .http_transport()
        .build(app)
        .expect("test server builds");
    (server, state)
}

async fn create_pc(server: &TestServer, key: &str, username: &str, password: &str) {
    let response = server
        .post(&format!("/create_pc/{key}"))
        .add_header("X-Username", ADMIN_USER)
        .add_header("X-Password", ADMIN_PASS)
        .json(&json!({ "username": username, "password": password, "key": key }))
        .await;
    response.assert_status(StatusCode::CREATED);
}

async fn create_user(server: &TestServer, pc_key: &str, username: &str, password: &str) {
    let response = server
        .post(&format!("/create_user/{pc_key}"))
        .add_header("X-Username", ADMIN_USER)
        .add_header("X-Password", ADMIN_PASS)
        .json(&json!({ "username": username, "password": password }))
        .await;
    response.assert_status(StatusCode::CREATED);
}

async fn set_user_permissions(server: &TestServer, username: &str, permissions: Value) {
    let response = server
        .post("/set_user_permissions/unused")
        .add_header("X-Username", ADMIN_USER)
        .add_header("X-Password", ADMIN_PASS)
        .json(&json!({ "username": username, "permissions": permissions }))
        .await;
    response.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn s1_registering_the_same_agent_twice_conflicts() {
    let (server, _state) = setup();
    create_pc(&server, "k1", "agent-1", "pw").await;

    let response = server
        .post("/create_pc/k1")
        .add_header("X-Username", ADMIN_USER)
        .add_header("X-Password", ADMIN_PASS)
        .json(&json!({ "username": "agent-1", "password": "pw", "key": "k1" }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn s2_operator_dial_without_headers_is_unauthorized() {
    let (server, _state) = setup();
    let response = server.get_websocket("/access/k1").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn s3_operator_dial_to_offline_agent_is_not_found() {
    let (server, _state) = setup();
    create_pc(&server, "k1", "agent-1", "pw").await;
    create_user(&server, "k1", "op-1", "oppw").await;

    let response = server
        .get_websocket("/access/k-missing")
        .add_header("X-Username", "op-1")
        .add_header("X-Password", "oppw")
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn s4_single_operator_invariant() {
    let (server, _state) = setup();
    create_pc(&server, "k1", "agent-1", "pw").await;
    create_user(&server, "k1", "op-1", "oppw").await;

    let _agent_ws = server
        .get_websocket("/connect/k1")
        .add_header("X-Username", "agent-1")
        .add_header("X-Password", "pw")
        .await
        .into_websocket()
        .await;

    let _first_operator = server
        .get_websocket("/access/k1")
        .add_header("X-Username", "op-1")
        .add_header("X-Password", "oppw")
        .await
        .into_websocket()
        .await;

    let second = server
        .get_websocket("/access/k1")
        .add_header("X-Username", "op-1")
        .add_header("X-Password", "oppw")
        .await;
    second.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn s5_closing_sockets_tears_down_the_session() {
    let (server, state) = setup();
    create_pc(&server, "k1", "agent-1", "pw").await;
    create_user(&server, "k1", "op-1", "oppw").await;

    let agent_ws = server
        .get_websocket("/connect/k1")
        .add_header("X-Username", "agent-1")
        .add_header("X-Password", "pw")
        .await
        .into_websocket()
        .await;

    let operator_ws = server
        .get_websocket("/access/k1")
        .add_header("X-Username", "op-1")
        .add_header("X-Password", "oppw")
        .await
        .into_websocket()
        .await;

    operator_ws.close().await;

    let session = poll_until(|| {
        let state = state.clone();
        async move { state.registry.lookup("k1") }
    })
    .await
    .expect("agent session survives operator disconnect");

    poll_until(|| {
        let session = session.clone();
        async move { (session.operator().await.is_none()).then_some(()) }
    })
    .await
    .expect("operator slot clears after operator disconnect");

    agent_ws.close().await;

    poll_until(|| {
        let state = state.clone();
        async move { state.registry.lookup("k1").is_none().then_some(()) }
    })
    .await
    .expect("session is removed after agent disconnect");
}

#[tokio::test]
async fn s6_permission_denied_path_blocks_the_command() {
    let (server, _state) = setup();
    create_pc(&server, "k1", "agent-1", "pw").await;
    create_user(&server, "k1", "op-1", "oppw").await;
    set_user_permissions(
        &server,
        "op-1",
        json!({
            "commands": {
                "ls_dir": {
                    "allow": true,
                    "restrictions": [{ "path": "/etc", "allow": false }]
                }
            }
        }),
    )
    .await;

    let mut agent_ws = server
        .get_websocket("/connect/k1")
        .add_header("X-Username", "agent-1")
        .add_header("X-Password", "pw")
        .await
        .into_websocket()
        .await;

    let mut operator_ws = server
        .get_websocket("/access/k1")
        .add_header("X-Username", "op-1")
        .add_header("X-Password", "oppw")
        .await
        .into_websocket()
        .await;

    // the "operator connected" info frame the Agent receives on attach
    let _connected: Value = agent_ws.receive_json().await;

    operator_ws
        .send_json(&json!({ "type": "command", "cmd": "ls_dir", "args": ["/etc"] }))
        .await;

    let error: Value = operator_ws.receive_json().await;
    assert_eq!(error["cmd_response"], json!("ls_dir"));
    assert_eq!(error["error_code"], json!(10));
    assert_eq!(error["error_msg"], json!("Permission denied"));

    let nothing = tokio::time::timeout(Duration::from_millis(200), agent_ws.receive_text()).await;
    assert!(nothing.is_err(), "agent must not receive a denied command");

    operator_ws
        .send_json(&json!({ "type": "command", "cmd": "ls_dir", "args": ["/home"] }))
        .await;
    let forwarded: Value = agent_ws.receive_json().await;
    assert_eq!(forwarded["cmd"], json!("ls_dir"));
    assert_eq!(forwarded["args"], json!(["/home"]));
}

#[tokio::test]
async fn s7_traversal_is_stripped_before_relay() {
    let (server, _state) = setup();
    create_pc(&server, "k1", "agent-1", "pw").await;
    create_user(&server, "k1", "op-1", "oppw").await;

    let mut agent_ws = server
        .get_websocket("/connect/k1")
        .add_header("X-Username", "agent-1")
        .add_header("X-Password", "pw")
        .await
        .into_websocket()
        .await;

    let mut operator_ws = server
        .get_websocket("/access/k1")
        .add_header("X-Username", "op-1")
        .add_header("X-Password", "oppw")
        .await
        .into_websocket()
        .await;

    let _connected: Value = agent_ws.receive_json().await;

    operator_ws
        .send_json(&json!({
            "type": "command",
            "cmd": "download_file",
            "args": ["../../etc/passwd"]
        }))
        .await;

    let forwarded: Value = agent_ws.receive_json().await;
    assert_eq!(forwarded["args"], json!(["etc/passwd"]));
}

/// Polls `f` every 20ms, up to 1s, until it returns `Some`.
async fn poll_until<F, Fut, T>(mut f: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    for _ in 0..50 {
        if let Some(value) = f().await {
            return Some(value);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    None
}
