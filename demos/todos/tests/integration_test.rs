//! Integration tests for the todos example with a scripted transport

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use phasewire_core::action::Phase;
use phasewire_core::http::{Method, Transport};
use phasewire_runtime::{PhaseDispatcher, Store};
use phasewire_testing::assertions::assert_phase_sequence;
use phasewire_testing::{ActionRecorder, MockTransport};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use todos::{baseline, create, fetch_all, reducer, sign_in, AppReducer, AppState, CREATE, FETCH_ALL};

fn setup(transport: &Arc<MockTransport>) -> Store<AppState, AppReducer> {
    let transport: Arc<dyn Transport> = transport.clone();
    Store::new(
        AppState::default(),
        reducer(),
        PhaseDispatcher::new(baseline("https://todos.test"), transport),
    )
}

#[tokio::test]
async fn test_fetch_all_loads_todos() {
    let transport = Arc::new(
        MockTransport::new()
            .respond_json(
                200,
                json!([
                    { "id": 1, "userId": 1, "title": "one", "completed": false },
                    { "id": 2, "userId": 1, "title": "two", "completed": true },
                ]),
            )
            .with_delay(Duration::from_millis(20)),
    );
    let store = setup(&transport);
    let mut recorder = ActionRecorder::attach(&store);

    let mut handle = store.dispatch(fetch_all(2)).await.unwrap();
    assert!(store.state(|s| s.todos.loading).await);
    handle.wait_with_timeout(Duration::from_secs(2)).await.unwrap();

    let slice = store.state(|s| s.todos.clone()).await;
    assert!(!slice.loading);
    assert!(slice.error.is_none());
    assert_eq!(slice.items.len(), 2);
    assert_eq!(slice.items[1].title, "two");

    let request = transport.last_request().unwrap();
    assert_eq!(request.full_url(), "https://todos.test/todos?_limit=2");
    assert_phase_sequence(recorder.drain(), FETCH_ALL, Phase::Success);
}

#[tokio::test]
async fn test_token_from_state_is_sent() {
    let transport = Arc::new(MockTransport::new().always_json(200, json!([])));
    let store = setup(&transport);

    store.dispatch(fetch_all(1)).await.unwrap().wait().await;
    assert!(!transport.last_request().unwrap().headers.contains_key("authorization"));

    store.dispatch(sign_in("s3cret")).await.unwrap();
    store.dispatch(fetch_all(1)).await.unwrap().wait().await;

    let request = transport.last_request().unwrap();
    assert_eq!(
        request.headers.get("authorization").map(String::as_str),
        Some("Bearer s3cret")
    );
}

#[tokio::test]
async fn test_create_posts_and_appends() {
    let transport = Arc::new(
        MockTransport::new().respond_json(201, json!({ "id": 201, "userId": 1, "title": "new", "completed": false })),
    );
    let store = setup(&transport);
    let mut recorder = ActionRecorder::attach(&store);

    store.dispatch(create("new")).await.unwrap().wait().await;

    let request = transport.last_request().unwrap();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.body.as_ref().unwrap()["title"], "new");

    let items = store.state(|s| s.todos.items.clone()).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, 201);
    assert_phase_sequence(recorder.drain(), CREATE, Phase::Success);
}

#[tokio::test]
async fn test_server_error_is_recorded() {
    let transport = Arc::new(MockTransport::new().respond_json(503, json!({ "message": "maintenance" })));
    let store = setup(&transport);
    let mut recorder = ActionRecorder::attach(&store);

    store.dispatch(fetch_all(5)).await.unwrap().wait().await;

    let slice = store.state(|s| s.todos.clone()).await;
    let failure = slice.error.unwrap();
    assert!(!slice.loading);
    assert_eq!(failure.status, 503);
    assert_eq!(failure.message, "maintenance");
    assert_phase_sequence(recorder.drain(), FETCH_ALL, Phase::Error);
}
