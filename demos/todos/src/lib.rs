//! # Todos Example
//!
//! A todo list backed by a JSON API, demonstrating phasewire.
//!
//! This example showcases:
//! - API actions with `LOADING` / `SUCCESS` / `ERROR` phases
//! - A baseline configuration with a state-derived bearer token
//! - Per-call options (path, query parameters, body)
//! - Reducers scoped to slices of the application state
//!
//! ## Example
//!
//! ```no_run
//! use phasewire_runtime::transport::ReqwestTransport;
//! use phasewire_runtime::{PhaseDispatcher, Store};
//! use std::sync::Arc;
//! use todos::{baseline, fetch_all, reducer, AppState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = PhaseDispatcher::new(
//!     baseline("https://jsonplaceholder.typicode.com"),
//!     Arc::new(ReqwestTransport::new()),
//! );
//! let store = Store::new(AppState::default(), reducer(), dispatcher);
//!
//! store.dispatch(fetch_all(5)).await?.wait().await;
//! let count = store.state(|s| s.todos.items.len()).await;
//! # Ok(())
//! # }
//! ```

use phasewire_core::action::{Action, ApiCall, Dispatch};
use phasewire_core::composition::{combine_reducers, scope_reducer, CombinedReducer};
use phasewire_core::config::Config;
use phasewire_core::error::{ApiError, ApiFailure};
use phasewire_core::handler::{api_handler, ApiState, HandlerTable};
use phasewire_core::http::HttpClient;
use phasewire_core::transform::bearer_token;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Store a session token
pub const SIGN_IN: &str = "todos/SIGN_IN";
/// Load the todo list
pub const FETCH_ALL: &str = "todos/FETCH_ALL";
/// Create a todo
pub const CREATE: &str = "todos/CREATE";

/// A todo as served by the API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Server-assigned id
    pub id: u64,
    /// Owner
    #[serde(default)]
    pub user_id: u64,
    /// What to do
    pub title: String,
    /// Done yet?
    #[serde(default)]
    pub completed: bool,
}

/// Todo list slice
#[derive(Debug, Clone, Default)]
pub struct TodosSlice {
    /// A call is in flight
    pub loading: bool,
    /// Failure of the last call
    pub error: Option<ApiFailure>,
    /// Loaded todos
    pub items: Vec<Todo>,
}

impl ApiState for TodosSlice {
    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    fn set_error(&mut self, failure: Option<&ApiFailure>) {
        self.error = failure.cloned();
    }
}

/// Session slice
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Bearer token sent with every request
    pub token: Option<String>,
}

/// Application state
#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// Todo list
    pub todos: TodosSlice,
    /// Current session
    pub session: Session,
}

/// Baseline configuration for every call
///
/// JSON in and out, plus `Authorization: Bearer <token>` once signed in.
#[must_use]
pub fn baseline(base_url: impl Into<String>) -> Config<AppState> {
    Config::new(base_url.into())
        .with_request_transform(bearer_token(|s: &AppState| s.session.token.clone()))
}

/// Sign in with `token`
#[must_use]
pub fn sign_in(token: &str) -> Action<AppState> {
    Action::with_value(SIGN_IN, json!(token))
}

/// Load the first `limit` todos
#[must_use]
pub fn fetch_all(limit: usize) -> Action<AppState> {
    Action::api(
        FETCH_ALL,
        ApiCall::new(|_: Arc<dyn Dispatch<AppState>>, client: HttpClient<AppState>| async move {
            let response = client.get(Config::default()).await?;
            Ok::<_, ApiError>(response.body)
        }),
    )
    .with_options(Config::path("/todos").with_param("_limit", limit.to_string()))
}

/// Create a todo titled `title`
#[must_use]
pub fn create(title: &str) -> Action<AppState> {
    let body = json!({ "title": title, "completed": false, "userId": 1 });

    Action::api(
        CREATE,
        ApiCall::new(|_: Arc<dyn Dispatch<AppState>>, client: HttpClient<AppState>| async move {
            let response = client.post(Config::default()).await?;
            tracing::debug!(status = response.status, "Todo created");
            Ok::<_, ApiError>(response.body)
        }),
    )
    .with_options(Config::path("/todos").with_body(body))
}

/// Application reducer
pub type AppReducer = CombinedReducer<AppState, Action<AppState>>;

/// Build the application reducer
#[must_use]
pub fn reducer() -> AppReducer {
    let todos = scope_reducer(
        api_handler(FETCH_ALL, |slice: &mut TodosSlice, action: &Action<AppState>| {
            slice.loading = false;
            slice.items = action
                .value()
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
        })
        .merge(api_handler(CREATE, |slice: &mut TodosSlice, action: &Action<AppState>| {
            slice.loading = false;
            match action.value().map(|v| serde_json::from_value::<Todo>(v.clone())) {
                Some(Ok(todo)) => slice.items.push(todo),
                Some(Err(e)) => tracing::warn!(error = %e, "Unexpected todo payload"),
                None => {},
            }
        })),
        |app: &AppState| &app.todos,
        |app: &mut AppState, todos| app.todos = todos,
    );

    let session = scope_reducer(
        HandlerTable::<Session, AppState>::new().on(
            SIGN_IN,
            |session: &mut Session, action: &Action<AppState>| {
                session.token = action.value().and_then(Value::as_str).map(str::to_string);
            },
        ),
        |app: &AppState| &app.session,
        |app: &mut AppState, session| app.session = session,
    );

    combine_reducers(vec![Box::new(todos), Box::new(session)])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use phasewire_core::reducer::Reducer;

    #[test]
    fn sign_in_stores_the_token() {
        let mut state = AppState::default();

        reducer().reduce(&mut state, &sign_in("abc"));

        assert_eq!(state.session.token.as_deref(), Some("abc"));
    }

    #[test]
    fn fetch_all_phases_update_the_slice() {
        let reducer = reducer();
        let mut state = AppState::default();

        reducer.reduce(&mut state, &Action::new("todos/FETCH_ALL_LOADING"));
        assert!(state.todos.loading);

        reducer.reduce(
            &mut state,
            &Action::with_value(
                "todos/FETCH_ALL_SUCCESS",
                json!([{ "id": 1, "userId": 2, "title": "a", "completed": true }]),
            ),
        );
        assert!(!state.todos.loading);
        assert_eq!(
            state.todos.items,
            vec![Todo {
                id: 1,
                user_id: 2,
                title: "a".to_string(),
                completed: true,
            }]
        );
    }

    #[test]
    fn created_todo_is_appended() {
        let reducer = reducer();
        let mut state = AppState::default();

        reducer.reduce(
            &mut state,
            &Action::with_value("todos/CREATE_SUCCESS", json!({ "id": 201, "title": "new" })),
        );

        assert_eq!(state.todos.items.len(), 1);
        assert_eq!(state.todos.items[0].title, "new");
    }

    #[test]
    fn options_target_the_todos_endpoint() {
        let action = fetch_all(3);
        let resolved = action
            .meta
            .options
            .as_ref()
            .unwrap()
            .resolve(&AppState::default())
            .unwrap();

        assert_eq!(resolved.path.as_deref(), Some("/todos"));
        assert_eq!(resolved.params.get("_limit").map(String::as_str), Some("3"));
    }
}
