//! Phase-aware state handlers
//!
//! A [`HandlerTable`] maps action types to state transitions. [`api_handler`]
//! builds the four entries of one API type: `LOADING` raises the loading
//! flag, `SUCCESS` runs the caller's handler, `ERROR` lowers the flag and
//! records the failure, and the base action leaves state alone. Action types
//! the table does not know are ignored.
//!
//! # Example
//!
//! ```
//! use phasewire_core::action::Action;
//! use phasewire_core::error::ApiFailure;
//! use phasewire_core::handler::{api_handler, ApiState};
//! use phasewire_core::reducer::Reducer;
//! use serde_json::json;
//!
//! #[derive(Default)]
//! struct Todos {
//!     loading: bool,
//!     error: Option<String>,
//!     items: Vec<i64>,
//! }
//!
//! impl ApiState for Todos {
//!     fn set_loading(&mut self, loading: bool) {
//!         self.loading = loading;
//!     }
//!
//!     fn set_error(&mut self, failure: Option<&ApiFailure>) {
//!         self.error = failure.map(|f| f.message.clone());
//!     }
//! }
//!
//! let table = api_handler("FETCH_ALL", |state: &mut Todos, action: &Action<Todos>| {
//!     state.loading = false;
//!     state.items = action
//!         .value()
//!         .and_then(|v| serde_json::from_value(v["todos"].clone()).ok())
//!         .unwrap_or_default();
//! });
//!
//! let mut state = Todos::default();
//! table.reduce(&mut state, &Action::new("FETCH_ALL_LOADING"));
//! assert!(state.loading);
//!
//! table.reduce(&mut state, &Action::with_value("FETCH_ALL_SUCCESS", json!({ "todos": [1, 2, 3] })));
//! assert!(!state.loading);
//! assert_eq!(state.items, vec![1, 2, 3]);
//! ```

use crate::action::{Action, ActionType, ApiTypes};
use crate::error::ApiFailure;
use crate::reducer::Reducer;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A state transition for one action type
///
/// `S` is the state being reduced, `R` the store state the action belongs to.
pub type Handler<S, R = S> = Arc<dyn Fn(&mut S, &Action<R>) + Send + Sync>;

/// State that tracks the progress of API calls
pub trait ApiState {
    /// Raise or lower the loading flag
    fn set_loading(&mut self, loading: bool);

    /// Record the failure of the last call, or clear it with `None`
    fn set_error(&mut self, failure: Option<&ApiFailure>);
}

/// Dispatch table from action type to handler
pub struct HandlerTable<S, R = S> {
    handlers: HashMap<ActionType, Handler<S, R>>,
}

impl<S, R> HandlerTable<S, R> {
    /// Empty table; reduces every action to the unchanged state
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `action_type`, replacing any existing entry
    #[must_use]
    pub fn on<F>(mut self, action_type: impl Into<ActionType>, handler: F) -> Self
    where
        F: Fn(&mut S, &Action<R>) + Send + Sync + 'static,
    {
        self.handlers.insert(action_type.into(), Arc::new(handler));
        self
    }

    /// Add every entry of `other`; entries of `other` win on collision
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.handlers.extend(other.handlers);
        self
    }

    /// Whether a handler is registered for `action_type`
    #[must_use]
    pub fn contains(&self, action_type: &ActionType) -> bool {
        self.handlers.contains_key(action_type)
    }

    /// Number of registered handlers
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the table has no handlers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<S, R> Default for HandlerTable<S, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, R> Clone for HandlerTable<S, R> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<S, R> fmt::Debug for HandlerTable<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().map(ActionType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("HandlerTable").field("types", &types).finish()
    }
}

impl<S, R> Reducer for HandlerTable<S, R> {
    type State = S;
    type Action = Action<R>;

    fn reduce(&self, state: &mut S, action: &Action<R>) {
        if let Some(handler) = self.handlers.get(&action.action_type) {
            handler(state, action);
        }
    }
}

/// Handlers for the phases of `base` with the default transitions
#[must_use]
pub fn api_handler<S, R, F>(base: impl Into<ActionType>, on_success: F) -> HandlerTable<S, R>
where
    S: ApiState + 'static,
    R: 'static,
    F: Fn(&mut S, &Action<R>) + Send + Sync + 'static,
{
    api_handler_with(base, on_success, |_| HandlerTable::new())
}

/// Like [`api_handler`], with per-phase overrides
///
/// `overrides` receives the derived identifiers; any entry it returns
/// replaces the default for that type.
///
/// ```
/// use phasewire_core::action::Action;
/// use phasewire_core::error::ApiFailure;
/// use phasewire_core::handler::{api_handler_with, ApiState, HandlerTable};
/// use phasewire_core::reducer::Reducer;
///
/// #[derive(Default)]
/// struct Flags {
///     loading: bool,
///     retries: u32,
/// }
///
/// impl ApiState for Flags {
///     fn set_loading(&mut self, loading: bool) {
///         self.loading = loading;
///     }
///     fn set_error(&mut self, _: Option<&ApiFailure>) {}
/// }
///
/// let table = api_handler_with(
///     "SAVE",
///     |_: &mut Flags, _: &Action<Flags>| {},
///     |types| HandlerTable::new().on(&types.error, |state: &mut Flags, _: &Action<Flags>| {
///         state.retries += 1;
///     }),
/// );
///
/// let mut state = Flags::default();
/// table.reduce(&mut state, &Action::new("SAVE_ERROR"));
/// assert_eq!(state.retries, 1);
/// ```
#[must_use]
pub fn api_handler_with<S, R, F, O>(
    base: impl Into<ActionType>,
    on_success: F,
    overrides: O,
) -> HandlerTable<S, R>
where
    S: ApiState + 'static,
    R: 'static,
    F: Fn(&mut S, &Action<R>) + Send + Sync + 'static,
    O: FnOnce(&ApiTypes) -> HandlerTable<S, R>,
{
    let types = ApiTypes::derive(base);
    let error_type = types.error.clone();

    let defaults = HandlerTable::new()
        .on(&types.base, |_: &mut S, _: &Action<R>| {})
        .on(&types.loading, |state: &mut S, _: &Action<R>| {
            state.set_loading(true);
            state.set_error(None);
        })
        .on(&types.success, on_success)
        .on(&types.error, move |state: &mut S, action: &Action<R>| {
            state.set_loading(false);
            match action.failure() {
                Some(failure) => state.set_error(Some(failure)),
                None => state.set_error(Some(&ApiFailure {
                    status: 0,
                    message: format!("{error_type} without failure payload"),
                    body: serde_json::Value::Null,
                })),
            }
        });

    defaults.merge(overrides(&types))
}
