//! Integration tests for the API server lifecycle and transport.
//!
//! Each test binds its own loopback port so the tests can run in parallel.
//!
//! Run with: cargo test --test api_tests

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::RwLock;

use spyglass::config::ApiConfig;
use spyglass::error::ApiError;
use spyglass::session::{Host, Session};
use spyglass::{ApiServer, LifecycleState};

fn store(config: ApiConfig) -> Arc<RwLock<ApiConfig>> {
    Arc::new(RwLock::new(config))
}

fn local(port: u16) -> ApiConfig {
    ApiConfig {
        address: "127.0.0.1".into(),
        port,
        ..ApiConfig::default()
    }
}

fn sample_host() -> Host {
    Host {
        mac: "aa:bb:cc:dd:ee:ff".into(),
        ipv4: "192.168.1.23".into(),
        hostname: "printer".into(),
        vendor: "Acme Corp".into(),
        first_seen: Utc::now(),
        last_seen: Utc::now(),
    }
}

#[tokio::test]
async fn plain_http_start_serve_stop() {
    let port = 18110;
    let server = ApiServer::new(store(local(port)), Session::new());

    server.start().await.expect("start should succeed");
    assert_eq!(server.state().await, LifecycleState::Running);

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://127.0.0.1:{}/api/session", port))
        .send()
        .await
        .expect("server should be reachable over plain HTTP");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .expect("CORS header should be present on every response"),
        "*"
    );
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body.get("started_at").is_some());

    // Close the client's pooled connection so shutdown has nothing to drain.
    drop(client);

    let began = Instant::now();
    server.stop().await.expect("stop should succeed");
    assert!(began.elapsed() < Duration::from_secs(1));
    assert_eq!(server.state().await, LifecycleState::Stopped);
}

#[tokio::test]
async fn double_start_and_double_stop_are_errors() {
    let port = 18111;
    let server = ApiServer::new(store(local(port)), Session::new());

    server.start().await.unwrap();
    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ApiError::AlreadyStarted));
    assert_eq!(server.state().await, LifecycleState::Running);

    server.stop().await.unwrap();
    let err = server.stop().await.unwrap_err();
    assert!(matches!(err, ApiError::NotRunning));
    assert_eq!(server.state().await, LifecycleState::Stopped);
}

#[tokio::test]
async fn parameters_are_reresolved_between_runs() {
    let first_port = 18112;
    let second_port = 18113;
    let store = store(local(first_port));
    let server = ApiServer::new(store.clone(), Session::new());

    server.start().await.unwrap();
    server.stop().await.unwrap();

    store.write().await.port = second_port;
    server.start().await.unwrap();

    let resp = reqwest::get(format!("http://127.0.0.1:{}/api/session", second_port))
        .await
        .expect("server should be listening on the new port");
    assert_eq!(resp.status(), 200);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn command_dispatch_maps_to_lifecycle() {
    let port = 18114;
    let server = ApiServer::new(store(local(port)), Session::new());

    server.handle_command("api.rest on").await.unwrap();
    assert!(server.running().await);
    server.handle_command("api.rest off").await.unwrap();
    assert!(!server.running().await);
}

#[tokio::test]
async fn missing_certificates_are_generated_and_served() {
    let port = 18115;
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("api.crt.pem");
    let key_path = dir.path().join("api.key.pem");

    let config = ApiConfig {
        certificate: cert_path.to_str().unwrap().into(),
        key: key_path.to_str().unwrap().into(),
        ..local(port)
    };
    let server = ApiServer::new(store(config), Session::new());
    server.start().await.expect("start should generate the pair");

    assert!(cert_path.exists());
    assert!(key_path.exists());
    let cert = std::fs::read_to_string(&cert_path).unwrap();
    assert!(cert.contains("BEGIN CERTIFICATE"));

    // Reachable via HTTPS with the self-signed pair...
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap();
    let resp = client
        .get(format!("https://127.0.0.1:{}/api/session", port))
        .send()
        .await
        .expect("server should be reachable over HTTPS");
    assert_eq!(resp.status(), 200);

    // ...and not via plain HTTP on the same port.
    let plain = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/api/session", port))
        .send()
        .await;
    assert!(plain.is_err());

    drop(client);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn operator_certificates_are_not_overwritten() {
    let port = 18116;
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("api.crt.pem");
    let key_path = dir.path().join("api.key.pem");

    // Provision a valid pair first, then record its exact contents.
    let config = ApiConfig {
        certificate: cert_path.to_str().unwrap().into(),
        key: key_path.to_str().unwrap().into(),
        ..local(port)
    };
    let server = ApiServer::new(store(config), Session::new());
    server.start().await.unwrap();
    server.stop().await.unwrap();

    let cert_before = std::fs::read(&cert_path).unwrap();
    let key_before = std::fs::read(&key_path).unwrap();

    server.start().await.unwrap();
    server.stop().await.unwrap();

    assert_eq!(std::fs::read(&cert_path).unwrap(), cert_before);
    assert_eq!(std::fs::read(&key_path).unwrap(), key_before);
}

#[tokio::test]
async fn configured_credentials_gate_every_route() {
    let port = 18117;
    let config = ApiConfig {
        username: "admin".into(),
        password: "secret".into(),
        ..local(port)
    };
    let server = ApiServer::new(store(config), Session::new());
    server.start().await.unwrap();

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    // No credentials.
    let resp = client.get(format!("{}/api/session", base)).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    assert!(resp.headers().get("www-authenticate").is_some());
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    // Wrong password.
    let resp = client
        .get(format!("{}/api/session", base))
        .basic_auth("admin", Some("wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // The events route is gated too.
    let resp = client.get(format!("{}/api/events", base)).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    // Correct credentials reach the handler.
    let resp = client
        .get(format!("{}/api/session", base))
        .basic_auth("admin", Some("secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    drop(client);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn partial_credentials_leave_routes_open() {
    let port = 18118;
    let config = ApiConfig {
        username: "admin".into(),
        ..local(port)
    };
    let server = ApiServer::new(store(config), Session::new());
    server.start().await.unwrap();

    let resp = reqwest::get(format!("http://127.0.0.1:{}/api/session", port))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn session_subresources_dispatch_by_path() {
    let port = 18119;
    let session = Session::new();
    session.snapshot_mut().await.lan.push(sample_host());

    let server = ApiServer::new(store(local(port)), session);
    server.start().await.unwrap();

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    let resp = client
        .get(format!("{}/api/session/lan/AA:BB:CC:DD:EE:FF", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["hostname"], "printer");

    let resp = client
        .get(format!("{}/api/session/lan/00:00:00:00:00:00", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("00:00:00:00:00:00"));

    let resp = client
        .get(format!("{}/api/session/started-at", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    drop(client);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn polling_events_honor_the_limit() {
    let port = 18120;
    let session = Session::new();
    for i in 0..3 {
        session
            .record_event("tick", serde_json::json!({ "seq": i }))
            .await;
    }

    let server = ApiServer::new(store(local(port)), session);
    server.start().await.unwrap();

    let base = format!("http://127.0.0.1:{}", port);
    let all: serde_json::Value = reqwest::get(format!("{}/api/events", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.as_array().unwrap().len(), 3);

    let limited: serde_json::Value = reqwest::get(format!("{}/api/events?n=2", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let limited = limited.as_array().unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0]["data"]["seq"], 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn websocket_mode_pushes_events_and_closes_on_stop() {
    let port = 18121;
    let session = Session::new();
    let config = ApiConfig {
        websocket: true,
        ..local(port)
    };
    let server = ApiServer::new(store(config), session.clone());
    server.start().await.unwrap();

    let (mut ws, _) = tokio_tungstenite::connect_async(format!(
        "ws://127.0.0.1:{}/api/events",
        port
    ))
    .await
    .expect("websocket upgrade should succeed");

    session
        .record_event("endpoint.new", serde_json::json!({"mac": "aa:bb:cc:dd:ee:ff"}))
        .await;

    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("event should be pushed promptly")
        .expect("stream should yield a frame")
        .expect("frame should be readable");
    let event: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(event["tag"], "endpoint.new");

    // Stop while the connection is still open: the server force-closes it
    // as part of the shutdown drain, so stop returns well under the
    // 60 second deadline.
    let began = Instant::now();
    let (stopped, _) = tokio::join!(server.stop(), async {
        // Drain the client side until the server closes the channel.
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
        let _ = ws.close(None).await;
    });
    stopped.expect("stop should succeed");
    assert!(began.elapsed() < Duration::from_secs(5));
    assert_eq!(server.state().await, LifecycleState::Stopped);
}

#[tokio::test]
async fn websocket_mode_rejects_plain_requests() {
    let port = 18122;
    let config = ApiConfig {
        websocket: true,
        ..local(port)
    };
    let server = ApiServer::new(store(config), Session::new());
    server.start().await.unwrap();

    let resp = reqwest::get(format!("http://127.0.0.1:{}/api/events", port))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn bind_conflict_fails_start_synchronously() {
    let port = 18123;
    let first = ApiServer::new(store(local(port)), Session::new());
    first.start().await.unwrap();

    let second = ApiServer::new(store(local(port)), Session::new());
    let err = second.start().await.unwrap_err();
    assert!(matches!(err, ApiError::Bind { .. }));
    assert_eq!(second.state().await, LifecycleState::Stopped);

    first.stop().await.unwrap();
}
