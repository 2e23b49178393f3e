//! HTTP round trips against a server bound to an ephemeral port.

use std::io;
use std::sync::Arc;

use rstest::rstest;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{decode_body, mount_path, serve};
use crate::manager::PluginManager;
use crate::tests::support::{Harness, weather_id};

struct RunningServer {
    base: String,
    stop: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

impl RunningServer {
    async fn start(manager: Arc<PluginManager>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("local address"));
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(listener, manager, async move {
            drop(stopped.await);
        }));
        Self { base, stop, task }
    }

    async fn request(&self, method: &'static str, path: &str, body: Option<&str>) -> (u16, Value) {
        let url = format!("{}{path}", self.base);
        let payload = body.map(str::to_owned);
        tokio::task::spawn_blocking(move || call(method, &url, payload.as_deref()))
            .await
            .expect("request thread")
    }

    async fn stop(self) {
        self.stop.send(()).expect("server still running");
        self.task
            .await
            .expect("server task")
            .expect("server exits cleanly");
    }
}

fn call(method: &str, url: &str, body: Option<&str>) -> (u16, Value) {
    let request = ureq::request(method, url).set("Content-Type", "application/json");
    let outcome = match body {
        Some(body) => request.send_string(body),
        None => request.call(),
    };
    let response = match outcome {
        Ok(response) | Err(ureq::Error::Status(_, response)) => response,
        Err(err) => panic!("transport failure: {err}"),
    };
    let status = response.status();
    (status, response.into_json().expect("json body"))
}

#[rstest]
#[case::mount_point("", "/plugins")]
#[case::operation("install", "/plugins/install")]
fn routes_mount_below_plugins(#[case] suffix: &str, #[case] expected: &str) {
    assert_eq!(mount_path(suffix), expected);
}

#[rstest]
#[case::empty(b"".as_slice())]
#[case::whitespace(b" \n\t".as_slice())]
fn blank_bodies_decode_as_empty_object(#[case] body: &[u8]) {
    assert_eq!(decode_body(body).expect("decodes"), json!({}));
}

#[test]
fn malformed_body_fails_to_decode() {
    assert!(decode_body(b"{\"id\":").is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn lists_catalog() {
    let harness = Harness::new();
    let server = RunningServer::start(Arc::clone(&harness.manager)).await;

    let (status, body) = server.request("GET", "/plugins", None).await;

    assert_eq!(status, 200);
    let plugins = body.as_array().expect("array body");
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins.first().and_then(|p| p.get("name")), Some(&json!("Weather")));
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_paths_are_not_found() {
    let harness = Harness::new();
    let server = RunningServer::start(Arc::clone(&harness.manager)).await;

    let (status, body) = server.request("POST", "/plugins/restart", Some("{}")).await;

    assert_eq!(status, 404);
    assert_eq!(body, json!({"error": "Not found."}));
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_json_is_rejected() {
    let harness = Harness::new();
    let server = RunningServer::start(Arc::clone(&harness.manager)).await;

    let (status, body) = server
        .request("POST", "/plugins/install", Some("{not json"))
        .await;

    assert_eq!(status, 400);
    assert_eq!(body, json!({"error": "Invalid request body."}));
    assert_eq!(harness.fetcher.calls(), 0);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_body_reports_missing_id() {
    let harness = Harness::new();
    let server = RunningServer::start(Arc::clone(&harness.manager)).await;

    let (status, body) = server.request("POST", "/plugins/install", None).await;

    assert_eq!(status, 400);
    assert_eq!(body, json!({"error": "Missing or invalid field 'id'."}));
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn full_lifecycle_over_http() {
    let harness = Harness::new();
    let server = RunningServer::start(Arc::clone(&harness.manager)).await;
    let id = json!({"id": weather_id().as_str()}).to_string();
    let token = json!({"id": weather_id().as_str(), "token": "secret"}).to_string();

    let (status, installed) = server.request("POST", "/plugins/install", Some(&id)).await;
    assert_eq!(status, 200);
    assert_eq!(installed.get("installed"), Some(&json!(true)));

    assert_eq!(server.request("POST", "/plugins/enable", Some(&id)).await.0, 200);
    let (status, enabled) = server.request("POST", "/plugins/token", Some(&token)).await;
    assert_eq!(status, 200);
    assert_eq!(enabled.get("enabled"), Some(&json!(true)));

    let (status, body) = server.request("POST", "/plugins/activate", Some(&id)).await;
    assert_eq!((status, body), (200, json!({})));

    let (_, listed) = server.request("GET", "/plugins", None).await;
    assert_eq!(
        listed.pointer("/0/active"),
        Some(&json!(true)),
        "listing should show the plugin running"
    );

    let (status, body) = server.request("POST", "/plugins/deactivate", Some(&id)).await;
    assert_eq!((status, body), (200, json!({})));
    assert_eq!(harness.provider.probe().stops(), 1);
    server.stop().await;
}
