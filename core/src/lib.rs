//! # Phasewire Core
//!
//! Core types for orchestrating HTTP calls as action phases.
//!
//! An action marked as an API action carries a resolution function instead
//! of data. The runtime turns it into a `<TYPE>_LOADING` action, runs the
//! function against an [`http::HttpClient`], and finishes with exactly one
//! `<TYPE>_SUCCESS` or `<TYPE>_ERROR` action. Reducers built from
//! [`handler::api_handler`] consume the phases.
//!
//! ## Core Concepts
//!
//! - **Action**: a type identifier, a payload and metadata ([`action`])
//! - **Config**: layered request configuration whose leaves may be computed
//!   from a state snapshot ([`config`])
//! - **Transform**: state-aware rewrites of requests and responses ([`transform`])
//! - **Transport**: the network boundary behind [`http::HttpClient`]
//! - **Reducer**: `(state, action) -> state`, usually a [`handler::HandlerTable`]
//!
//! ## Example
//!
//! ```
//! use phasewire_core::config::Config;
//!
//! #[derive(Default)]
//! struct Session {
//!     token: String,
//! }
//!
//! let baseline = Config::<Session>::new("https://api.example.test")
//!     .with_headers_from(|s: &Session| [("x-token".to_string(), s.token.clone())].into());
//! let per_call = Config::path("/todos").with_param("page", "2");
//!
//! let resolved = baseline.merge(&per_call).resolve(&Session { token: "abc".into() }).unwrap();
//! assert_eq!(resolved.headers["x-token"], "abc");
//! assert_eq!(resolved.path.as_deref(), Some("/todos"));
//! ```

pub use serde::{Deserialize, Serialize};
pub use serde_json::{json, Value};

pub mod action;
pub mod composition;
pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod transform;

/// Reducer module - state transitions
pub mod reducer {
    /// A pure state transition
    ///
    /// # Example
    ///
    /// ```
    /// use phasewire_core::reducer::Reducer;
    ///
    /// struct Counter;
    ///
    /// impl Reducer for Counter {
    ///     type State = i64;
    ///     type Action = i64;
    ///
    ///     fn reduce(&self, state: &mut i64, action: &i64) {
    ///         *state += action;
    ///     }
    /// }
    ///
    /// let mut total = 0;
    /// Counter.reduce(&mut total, &5);
    /// assert_eq!(total, 5);
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// Apply `action` to `state` in place
        ///
        /// Actions the reducer does not handle must leave `state` unchanged.
        fn reduce(&self, state: &mut Self::State, action: &Self::Action);
    }
}

pub use action::{Action, ActionType, ApiCall, ApiTypes, Constants, Dispatch, Meta, Payload, Phase};
pub use config::{Config, ConfigValue, HeaderLayer, ResolvedConfig};
pub use error::{ApiError, ApiFailure, ConfigError, DispatchError, TransformError, TransportError};
pub use handler::{api_handler, api_handler_with, ApiState, HandlerTable};
pub use http::{HttpClient, Method, RawResponse, RequestDescriptor, ResponseEnvelope, Transport};
pub use reducer::Reducer;
pub use transform::{RequestTransform, ResponseTransform, Transform};
