//! `ReqwestTransport` against a local mock server

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use phasewire_core::config::Config;
use phasewire_core::error::ApiError;
use phasewire_core::http::{HttpClient, Transport};
use phasewire_core::transform::bearer_token;
use phasewire_runtime::transport::ReqwestTransport;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Session {
    token: Option<String>,
}

async fn setup(token: Option<&str>) -> (MockServer, HttpClient<Session>) {
    let server = MockServer::start().await;
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new());
    let baseline = Config::new(server.uri())
        .with_request_transform(bearer_token(|s: &Session| s.token.clone()));
    let session = Session {
        token: token.map(str::to_string),
    };
    let client = HttpClient::new(baseline, transport, Arc::new(session));
    (server, client)
}

#[tokio::test]
async fn get_sends_query_and_headers() {
    let (server, client) = setup(Some("t0k3n")).await;

    Mock::given(method("GET"))
        .and(path("/todos"))
        .and(query_param("page", "2"))
        .and(header("authorization", "Bearer t0k3n"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "todos": [1, 2] })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client
        .get(Config::path("/todos").with_param("page", "2"))
        .await
        .unwrap();

    assert!(response.ok);
    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({ "todos": [1, 2] }));
    assert_eq!(
        response.headers.get("content-type").map(String::as_str),
        Some("application/json")
    );
}

#[tokio::test]
async fn post_encodes_json_body() {
    let (server, client) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/todos"))
        .and(body_json(json!({ "title": "ship it", "done": false })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 3 })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client
        .post(Config::path("/todos").with_body(json!({ "title": "ship it", "done": false })))
        .await
        .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.body["id"], 3);
}

#[tokio::test]
async fn string_body_is_sent_as_is() {
    let (server, client) = setup(None).await;

    Mock::given(method("PUT"))
        .and(path("/raw"))
        .and(body_string("a=1&b=2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let response = client
        .put(Config::path("/raw").with_body(Value::String("a=1&b=2".to_string())))
        .await
        .unwrap();

    assert_eq!(response.status, 204);
    assert_eq!(response.body, Value::Null);
}

#[tokio::test]
async fn patch_delete_and_head_use_their_verbs() {
    let (server, client) = setup(None).await;

    for verb in ["PATCH", "DELETE", "HEAD"] {
        Mock::given(method(verb))
            .and(path("/todos/1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    assert!(client.patch("/todos/1").await.unwrap().ok);
    assert!(client.delete("/todos/1").await.unwrap().ok);
    assert!(client.head("/todos/1").await.unwrap().ok);
}

#[tokio::test]
async fn error_status_keeps_the_parsed_body() {
    let (server, client) = setup(None).await;

    Mock::given(method("GET"))
        .and(path("/todos"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({ "message": "invalid" })))
        .mount(&server)
        .await;

    let error = client.get("/todos").await.unwrap_err();

    let ApiError::Status { status, body } = &error else {
        panic!("expected status error, got {error:?}");
    };
    assert_eq!(*status, 422);
    assert_eq!(body["message"], "invalid");
    assert_eq!(error.normalize().message, "invalid");
}

#[tokio::test]
async fn non_json_error_body_stays_text() {
    let (server, client) = setup(None).await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let error = client.get("/broken").await.unwrap_err();

    assert_eq!(error.normalize().status, 502);
    assert_eq!(error.normalize().message, "<html>bad gateway</html>");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new());
    // Port 1 is never listening
    let client = HttpClient::new(Config::<()>::new("http://127.0.0.1:1"), transport, Arc::new(()));

    let error = client.get("/todos").await.unwrap_err();

    assert!(matches!(error, ApiError::Transport { status: None, .. }));
    assert_eq!(error.normalize().status, 0);
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::with_timeout(Duration::from_millis(50)).unwrap());
    let client = HttpClient::new(Config::<()>::new(server.uri()), transport, Arc::new(()));

    let error = client.get("/slow").await.unwrap_err();

    assert!(matches!(error, ApiError::Transport { .. }));
}
