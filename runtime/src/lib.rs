//! # Phasewire Runtime
//!
//! The Store that owns state, runs the phase dispatcher in front of the
//! reducer, and executes API calls on spawned tasks.
//!
//! ## Core Components
//!
//! - **Store**: state behind a `RwLock`, the reducer, and the dispatcher
//! - **Phase Dispatcher**: turns API actions into `LOADING` and a terminal phase
//! - **Transport**: [`transport::ReqwestTransport`] for production use
//!
//! ## Example
//!
//! ```ignore
//! use phasewire_runtime::{PhaseDispatcher, Store, transport::ReqwestTransport};
//!
//! let dispatcher = PhaseDispatcher::new(Config::new(base_url), Arc::new(ReqwestTransport::new()));
//! let store = Store::new(AppState::default(), app_reducer(), dispatcher);
//!
//! let mut handle = store.dispatch(fetch_todos()).await?;
//! handle.wait().await;
//!
//! let todos = store.state(|s| s.todos.clone()).await;
//! ```

use phasewire_core::action::{Action, Dispatch};
use phasewire_core::reducer::Reducer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Phase dispatcher middleware
pub mod middleware;

/// Metric descriptions and Prometheus recorder
pub mod metrics;

/// HTTP transport backed by reqwest
pub mod transport;

pub use middleware::{Interception, PendingCall, PhaseDispatcher};

/// Error types for the Store runtime
pub mod error {
    use phasewire_core::error::{ConfigError, DispatchError};
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for calls to settle
        #[error("Shutdown timed out with {0} calls still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for an action or a call
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,

        /// Configuration of an API action could not be resolved
        ///
        /// The `LOADING` and `ERROR` phases have already been reduced when
        /// this is returned.
        #[error(transparent)]
        Config(#[from] ConfigError),
    }

    impl From<StoreError> for DispatchError {
        fn from(error: StoreError) -> Self {
            match error {
                StoreError::ShutdownInProgress => Self::ShuttingDown,
                StoreError::Config(cause) => Self::Config(cause),
                other => Self::Rejected(other.to_string()),
            }
        }
    }
}

pub use error::StoreError;

/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use phasewire_runtime::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_broadcast_capacity(256)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.broadcast_capacity, 256);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the action broadcast channel
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Create a configuration with custom values
    #[must_use]
    pub const fn new(broadcast_capacity: usize, default_shutdown_timeout: Duration) -> Self {
        Self {
            broadcast_capacity,
            default_shutdown_timeout,
        }
    }

    /// Set the broadcast channel capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 64,
            default_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Handle for waiting on an API call
///
/// Returned by [`Store::dispatch`]. Resolves once the call's terminal action
/// has been reduced. Handles of plain actions are already complete.
///
/// ```ignore
/// let mut handle = store.dispatch(fetch_todos()).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // FETCH_ALL_SUCCESS or FETCH_ALL_ERROR has been reduced
/// ```
#[derive(Clone)]
pub struct CallHandle {
    settled: watch::Receiver<bool>,
}

impl CallHandle {
    fn pending() -> (Self, SettleGuard) {
        let (tx, rx) = watch::channel(false);
        (Self { settled: rx }, SettleGuard(tx))
    }

    /// A handle that is already complete
    #[must_use]
    pub fn completed() -> Self {
        let (_, rx) = watch::channel(true);
        Self { settled: rx }
    }

    /// Whether the terminal action has been reduced
    #[must_use]
    pub fn is_settled(&self) -> bool {
        *self.settled.borrow()
    }

    /// Wait until the terminal action has been reduced
    pub async fn wait(&mut self) {
        while !*self.settled.borrow_and_update() {
            if self.settled.changed().await.is_err() {
                // Sender dropped: the guard always sets `true` first
                break;
            }
        }
    }

    /// Wait with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the call has not settled in time.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandle")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Internal: marks the call settled on drop, even if the task panics
struct SettleGuard(watch::Sender<bool>);

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Action, Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, CallHandle, Dispatch, Duration,
        Interception, Ordering, PhaseDispatcher, Reducer, RwLock, StoreConfig, StoreError,
    };
    use futures::future::BoxFuture;
    use phasewire_core::error::DispatchError;
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a reducer
    ///
    /// Owns:
    /// 1. State (behind `RwLock`)
    /// 2. Reducer
    /// 3. Phase dispatcher with its baseline configuration and transport
    /// 4. In-flight API calls (spawned tasks)
    ///
    /// Cloning a store is cheap; clones share everything.
    pub struct Store<S, R> {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        dispatcher: Arc<PhaseDispatcher<S>>,
        config: StoreConfig,
        shutdown: Arc<AtomicBool>,
        pending_calls: Arc<AtomicUsize>,
        /// Every action reduced by the store, phase actions included
        action_broadcast: broadcast::Sender<Action<S>>,
    }

    impl<S, R> Store<S, R>
    where
        R: Reducer<State = S, Action = Action<S>> + Send + Sync + 'static,
        S: Clone + Send + Sync + 'static,
    {
        /// Create a new store with the default [`StoreConfig`]
        #[must_use]
        pub fn new(initial_state: S, reducer: R, dispatcher: PhaseDispatcher<S>) -> Self {
            Self::with_config(initial_state, reducer, dispatcher, StoreConfig::default())
        }

        /// Create a new store with a custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            dispatcher: PhaseDispatcher<S>,
            config: StoreConfig,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                dispatcher: Arc::new(dispatcher),
                config,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_calls: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
            }
        }

        /// Store configuration
        #[must_use]
        pub const fn config(&self) -> &StoreConfig {
            &self.config
        }

        /// Number of API calls still running
        #[must_use]
        pub fn pending_calls(&self) -> usize {
            self.pending_calls.load(Ordering::Acquire)
        }

        /// Initiate graceful shutdown
        ///
        /// New dispatches are rejected; calls already in flight run to their
        /// terminal phase. Nothing is cancelled.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if calls are still running
        /// when `timeout` expires.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_calls.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All calls settled, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_calls = pending, "Shutdown timeout: {} calls still running", pending);
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tracing::debug!(
                    pending_calls = pending,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Waiting for calls to settle"
                );

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Dispatch an action
        ///
        /// Plain actions are reduced before this returns. API actions have
        /// their `LOADING` phase reduced before this returns; the resolution
        /// function then runs on a spawned task and its terminal phase is
        /// reduced when it settles.
        ///
        /// # Returns
        ///
        /// A [`CallHandle`] that completes once the terminal phase has been
        /// reduced (immediately for plain actions).
        ///
        /// # Errors
        ///
        /// - [`StoreError::ShutdownInProgress`] if the store is shutting down
        /// - [`StoreError::Config`] if the call's configuration failed to
        ///   resolve; `LOADING` and `ERROR` have been reduced by then
        #[tracing::instrument(skip(self, action), fields(action_type = %action.action_type), name = "store_dispatch")]
        pub async fn dispatch(&self, action: Action<S>) -> Result<CallHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.actions.total").increment(1);

            if !action.is_api() {
                self.apply(action).await;
                return Ok(CallHandle::completed());
            }

            let snapshot = Arc::new(self.state.read().await.clone());
            let dispatch: Arc<dyn Dispatch<S>> = Arc::new(self.clone());

            match self.dispatcher.intercept(action, snapshot, dispatch) {
                Interception::PassThrough(action) => {
                    self.apply(action).await;
                    Ok(CallHandle::completed())
                },
                Interception::Rejected { loading, error, cause } => {
                    self.apply(loading).await;
                    self.apply(error).await;
                    Err(StoreError::Config(cause))
                },
                Interception::Call { loading, pending } => {
                    self.apply(loading).await;

                    let (handle, settle_guard) = CallHandle::pending();
                    self.pending_calls.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_calls));
                    let store = self.clone();

                    tracing::trace!(action_type = %pending.types().base, "Spawning API call");
                    tokio::spawn(async move {
                        let _pending_guard = pending_guard;
                        let _settle_guard = settle_guard;

                        let terminal = pending.settle().await;
                        store.apply(terminal).await;
                    });

                    Ok(handle)
                },
            }
        }

        /// Dispatch an action and wait for a matching emitted action
        ///
        /// Subscribes before dispatching, so the match cannot be missed.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action within `timeout`
        /// - [`StoreError::ChannelClosed`]: the broadcast channel closed
        /// - any error of [`Store::dispatch`], except [`StoreError::Config`]
        ///   when the matching action was already emitted
        pub async fn dispatch_and_wait_for<F>(
            &self,
            action: Action<S>,
            predicate: F,
            timeout: Duration,
        ) -> Result<Action<S>, StoreError>
        where
            F: Fn(&Action<S>) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            match self.dispatch(action).await {
                Ok(_) | Err(StoreError::Config(_)) => {},
                Err(error) => return Err(error),
            }

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged, {} actions skipped", skipped);
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to every action the store reduces
        ///
        /// Phase actions (`LOADING`, `SUCCESS`, `ERROR`) are delivered in the
        /// order they were reduced. A lagging receiver skips old actions.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<Action<S>> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let loading = store.state(|s| s.todos.loading).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Reduce one action and broadcast it
        async fn apply(&self, action: Action<S>) {
            let mut state = self.state.write().await;
            tracing::trace!(action_type = %action.action_type, "Acquired write lock on state");

            let span = tracing::debug_span!("reducer_execution");
            let entered = span.enter();

            let start = std::time::Instant::now();
            self.reducer.reduce(&mut *state, &action);
            metrics::histogram!("store.reducer.duration_seconds").record(start.elapsed().as_secs_f64());
            drop(entered);

            // Sent while the write lock is held: broadcast order is reduction order.
            // No receivers is fine.
            let _ = self.action_broadcast.send(action);
        }
    }

    impl<S, R> Dispatch<S> for Store<S, R>
    where
        R: Reducer<State = S, Action = Action<S>> + Send + Sync + 'static,
        S: Clone + Send + Sync + 'static,
    {
        fn dispatch(&self, action: Action<S>) -> BoxFuture<'_, Result<(), DispatchError>> {
            Box::pin(async move {
                Self::dispatch(self, action)
                    .await
                    .map(|_| ())
                    .map_err(DispatchError::from)
            })
        }
    }

    impl<S, R> Clone for Store<S, R> {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                dispatcher: Arc::clone(&self.dispatcher),
                config: self.config.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_calls: Arc::clone(&self.pending_calls),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }

    impl<S, R> std::fmt::Debug for Store<S, R> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Store")
                .field("config", &self.config)
                .field("pending_calls", &self.pending_calls.load(Ordering::Acquire))
                .field("shutdown", &self.shutdown.load(Ordering::Acquire))
                .finish_non_exhaustive()
        }
    }
}

pub use store::Store;
