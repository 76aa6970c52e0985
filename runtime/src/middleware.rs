//! Phase dispatcher
//!
//! Intercepts API actions on their way into the store. For each one it
//! resolves the baseline configuration merged with the action's options
//! against a state snapshot, produces the `LOADING` action, and prepares a
//! [`PendingCall`] that runs the resolution function and yields exactly one
//! terminal action. Everything else passes through untouched.

use futures::FutureExt;
use phasewire_core::action::{Action, ApiCall, ApiTypes, Dispatch, Meta, Payload, Phase};
use phasewire_core::config::{Config, ResolvedConfig};
use phasewire_core::error::{ApiError, ConfigError};
use phasewire_core::http::{HttpClient, Transport};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Outcome of intercepting one action
pub enum Interception<S> {
    /// Not an API action; reduce it as is
    PassThrough(Action<S>),

    /// API action whose call is ready to run
    Call {
        /// `<base>_LOADING`, to be reduced before the call starts
        loading: Action<S>,
        /// The call itself
        pending: PendingCall<S>,
    },

    /// API action whose configuration failed to resolve
    ///
    /// Both actions are reduced immediately; the call never starts.
    Rejected {
        /// `<base>_LOADING`
        loading: Action<S>,
        /// `<base>_ERROR` carrying the normalized configuration error
        error: Action<S>,
        /// What went wrong
        cause: ConfigError,
    },
}

impl<S> fmt::Debug for Interception<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PassThrough(action) => f.debug_tuple("PassThrough").field(action).finish(),
            Self::Call { loading, pending } => f
                .debug_struct("Call")
                .field("loading", loading)
                .field("pending", pending)
                .finish(),
            Self::Rejected { loading, error, cause } => f
                .debug_struct("Rejected")
                .field("loading", loading)
                .field("error", error)
                .field("cause", cause)
                .finish(),
        }
    }
}

/// An API call between its `LOADING` and terminal phase
pub struct PendingCall<S> {
    types: ApiTypes,
    meta: Meta<S>,
    call: Option<ApiCall<S>>,
    client: HttpClient<S>,
    dispatch: Arc<dyn Dispatch<S>>,
}

impl<S> fmt::Debug for PendingCall<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("types", &self.types)
            .field("has_call", &self.call.is_some())
            .finish_non_exhaustive()
    }
}

impl<S> PendingCall<S>
where
    S: Send + Sync + 'static,
{
    /// Identifiers of the call's phases
    #[must_use]
    pub const fn types(&self) -> &ApiTypes {
        &self.types
    }

    /// Run the resolution function and build the terminal action
    ///
    /// Never fails: a rejection, a panic inside the resolution function, or
    /// a missing resolution function all become `<base>_ERROR`.
    pub async fn settle(self) -> Action<S> {
        let Self {
            types,
            meta,
            call,
            client,
            dispatch,
        } = self;

        let result = match call {
            Some(call) => AssertUnwindSafe(async move { call.invoke(dispatch, client).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(ApiError::Aborted(panic_message(panic.as_ref())))),
            None => Err(ApiError::Aborted(format!(
                "{} has no resolution function",
                types.base
            ))),
        };

        match result {
            Ok(value) => {
                tracing::debug!(action_type = %types.success, "API call succeeded");
                phase_action(&types, Phase::Success, Payload::Value(value), meta)
            },
            Err(error) => {
                tracing::warn!(action_type = %types.error, error = %error, "API call failed");
                phase_action(&types, Phase::Error, Payload::Failure(error.normalize()), meta)
            },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "resolution function panicked".to_string())
}

fn phase_action<S>(types: &ApiTypes, phase: Phase, payload: Payload<S>, meta: Meta<S>) -> Action<S> {
    metrics::counter!("store.api.phases", "phase" => phase.label()).increment(1);
    Action {
        action_type: types.get(phase).clone(),
        payload,
        meta,
    }
}

/// Expands API actions into their phases
pub struct PhaseDispatcher<S> {
    config: Arc<Config<S>>,
    transport: Arc<dyn Transport>,
}

impl<S> Clone for PhaseDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<S> fmt::Debug for PhaseDispatcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseDispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> PhaseDispatcher<S>
where
    S: Send + Sync + 'static,
{
    /// Create a dispatcher with a baseline configuration and a transport
    #[must_use]
    pub fn new(config: Config<S>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    /// Baseline configuration
    #[must_use]
    pub fn config(&self) -> &Config<S> {
        &self.config
    }

    /// Intercept one action
    ///
    /// `snapshot` is the state the call resolves against, for its whole
    /// lifetime. `dispatch` is handed to the resolution function.
    pub fn intercept(
        &self,
        action: Action<S>,
        snapshot: Arc<S>,
        dispatch: Arc<dyn Dispatch<S>>,
    ) -> Interception<S> {
        if !action.is_api() {
            tracing::trace!(action_type = %action.action_type, "Passing through");
            return Interception::PassThrough(action);
        }

        let types = ApiTypes::derive(action.action_type);
        let options = action.meta.options.unwrap_or_default();
        tracing::debug!(action_type = %types.base, "Intercepted API action");

        match self.config.merge(&options).resolve(&snapshot) {
            Ok(resolved) => {
                let meta = phase_meta(options, Some(resolved.clone()));
                let loading = phase_action(&types, Phase::Loading, Payload::None, meta.clone());
                let call = match action.payload {
                    Payload::Call(call) => Some(call),
                    _ => None,
                };
                let client = self.client_for(resolved, snapshot);

                Interception::Call {
                    loading,
                    pending: PendingCall {
                        types,
                        meta,
                        call,
                        client,
                        dispatch,
                    },
                }
            },
            Err(cause) => {
                tracing::warn!(action_type = %types.base, error = %cause, "Config resolution failed");
                let meta = phase_meta(options, None);
                let loading = phase_action(&types, Phase::Loading, Payload::None, meta.clone());
                let failure = ApiError::from(cause.clone()).normalize();
                let error = phase_action(&types, Phase::Error, Payload::Failure(failure), meta);

                Interception::Rejected {
                    loading,
                    error,
                    cause,
                }
            },
        }
    }

    fn client_for(&self, resolved: ResolvedConfig<S>, snapshot: Arc<S>) -> HttpClient<S> {
        HttpClient::new(Config::from(resolved), Arc::clone(&self.transport), snapshot)
    }
}

fn phase_meta<S>(options: Config<S>, resolved: Option<ResolvedConfig<S>>) -> Meta<S> {
    Meta {
        is_api: false,
        options: Some(options),
        resolved,
    }
}
