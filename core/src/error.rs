//! Error types shared by the configuration resolver, the transform pipeline,
//! the HTTP client and the phase dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while resolving configuration against a state snapshot
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A computed configuration entry failed
    #[error("Computed config value `{key}` failed: {message}")]
    Computed {
        /// Name of the entry being resolved
        key: String,
        /// Failure reported by the resolver function
        message: String,
    },

    /// Neither `url` nor `base_url` was configured
    #[error("No base URL configured and no `url` override given")]
    MissingBaseUrl,
}

impl ConfigError {
    /// Build a [`ConfigError::Computed`] for the given key
    #[must_use]
    pub fn computed(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Computed {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// A request or response transform rejected its input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Transform failed: {message}")]
pub struct TransformError {
    /// Why the transform failed
    pub message: String,
}

impl TransformError {
    /// Create a transform error
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure at the transport boundary (DNS, connect, timeout, body read)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Transport failed: {message}")]
pub struct TransportError {
    /// Status reported by the transport, if it got that far
    pub status: Option<u16>,
    /// Description of the failure
    pub message: String,
}

impl TransportError {
    /// Create a transport error without a status
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Attach the status reported by the transport
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Everything that can make an API call end in the `ERROR` phase
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Configuration could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A request or response transform failed
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The network call itself failed
    #[error("Transport failed: {message}")]
    Transport {
        /// Status reported by the transport, `None` when unreachable
        status: Option<u16>,
        /// Description of the failure
        message: String,
    },

    /// The server answered with a non-2xx status
    #[error("Request failed with status {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body after response transforms
        body: Value,
    },

    /// The resolution function panicked or never produced a result
    #[error("API call aborted: {0}")]
    Aborted(String),
}

impl From<TransportError> for ApiError {
    fn from(error: TransportError) -> Self {
        Self::Transport {
            status: error.status,
            message: error.message,
        }
    }
}

impl ApiError {
    /// Shorthand for a status rejection, mostly useful in resolution functions
    #[must_use]
    pub const fn status(status: u16, body: Value) -> Self {
        Self::Status { status, body }
    }

    /// Normalize into the payload carried by an `ERROR` phase action
    ///
    /// Transport failures and HTTP status failures share one shape; only the
    /// `status` field tells them apart (0 when the server was unreachable).
    #[must_use]
    pub fn normalize(&self) -> ApiFailure {
        match self {
            Self::Status { status, body } => ApiFailure {
                status: *status,
                message: message_from_body(body)
                    .unwrap_or_else(|| format!("Request failed with status {status}")),
                body: body.clone(),
            },
            Self::Transport { status, message } => ApiFailure {
                status: status.unwrap_or(0),
                message: message.clone(),
                body: serde_json::json!({ "message": message }),
            },
            other => {
                let message = other.to_string();
                ApiFailure {
                    status: 0,
                    body: serde_json::json!({ "message": message }),
                    message,
                }
            },
        }
    }
}

fn message_from_body(body: &Value) -> Option<String> {
    match body {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Normalized error payload of an `ERROR` phase action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiFailure {
    /// HTTP status, or 0 when no response was received
    pub status: u16,
    /// Human-readable message
    pub message: String,
    /// Error body as returned (and transformed) or synthesized
    pub body: Value,
}

/// Errors returned when handing an action to a dispatcher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatcher no longer accepts actions
    #[error("Dispatcher is shutting down")]
    ShuttingDown,

    /// Configuration for an API action could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The dispatcher refused the action for another reason
    #[error("Dispatch rejected: {0}")]
    Rejected(String),
}
