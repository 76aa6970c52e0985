//! # Phasewire Testing
//!
//! Testing utilities for phasewire.
//!
//! This crate provides:
//! - [`MockTransport`]: scripted HTTP responses with request capture
//! - [`ActionRecorder`]: collects the actions a store emits
//! - [`ReducerTest`]: Given-When-Then reducer tests
//! - Assertion helpers for phase sequences
//!
//! ## Example
//!
//! ```ignore
//! use phasewire_testing::{ActionRecorder, MockTransport, assertions::assert_phase_sequence};
//!
//! #[tokio::test]
//! async fn fetch_all_succeeds() {
//!     let transport = Arc::new(MockTransport::new().respond_json(200, json!({ "todos": [1, 2, 3] })));
//!     let store = Store::new(TodoState::default(), todos_reducer(), dispatcher(transport.clone()));
//!     let mut recorder = ActionRecorder::attach(&store);
//!
//!     store.dispatch(fetch_all()).await.unwrap().wait().await;
//!
//!     assert_phase_sequence(recorder.drain(), "FETCH_ALL", Phase::Success);
//! }
//! ```

mod reducer_test;

pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations of the transport boundary
pub mod mocks {
    use futures::future::BoxFuture;
    use phasewire_core::error::TransportError;
    use phasewire_core::http::{RawResponse, RequestDescriptor, Transport};
    use serde_json::Value;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    type Scripted = Result<RawResponse, TransportError>;

    /// Transport that answers from a script and records every request
    ///
    /// Scripted responses are consumed in order. Once the script is empty,
    /// the fallback answers (if set); otherwise the request fails with a
    /// [`TransportError`].
    ///
    /// # Example
    ///
    /// ```
    /// use phasewire_testing::mocks::MockTransport;
    /// use serde_json::json;
    ///
    /// let transport = MockTransport::new()
    ///     .respond_json(200, json!({ "id": 1 }))
    ///     .fail("connection reset");
    /// assert_eq!(transport.request_count(), 0);
    /// ```
    #[derive(Debug, Default)]
    pub struct MockTransport {
        script: Mutex<VecDeque<Scripted>>,
        fallback: Option<Scripted>,
        delay: Option<Duration>,
        requests: Mutex<Vec<RequestDescriptor>>,
    }

    fn json_response(status: u16, body: &Value) -> RawResponse {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        RawResponse {
            status,
            headers,
            body: body.to_string().into_bytes(),
        }
    }

    impl MockTransport {
        /// Transport with an empty script
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a raw response
        #[must_use]
        pub fn respond(self, response: RawResponse) -> Self {
            self.push(Ok(response))
        }

        /// Queue a JSON response
        #[must_use]
        pub fn respond_json(self, status: u16, body: Value) -> Self {
            self.push(Ok(json_response(status, &body)))
        }

        /// Queue a transport failure
        #[must_use]
        pub fn fail(self, message: &str) -> Self {
            self.push(Err(TransportError::new(message)))
        }

        /// Answer every unscripted request with a JSON response
        #[must_use]
        pub fn always_json(mut self, status: u16, body: Value) -> Self {
            self.fallback = Some(Ok(json_response(status, &body)));
            self
        }

        /// Delay every answer
        #[must_use]
        pub const fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn push(self, scripted: Scripted) -> Self {
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(scripted);
            self
        }

        /// Requests received so far, in order
        #[must_use]
        pub fn requests(&self) -> Vec<RequestDescriptor> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of requests received so far
        #[must_use]
        pub fn request_count(&self) -> usize {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        /// Most recent request
        #[must_use]
        pub fn last_request(&self) -> Option<RequestDescriptor> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .last()
                .cloned()
        }
    }

    impl Transport for MockTransport {
        fn send(&self, request: RequestDescriptor) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
            let url = request.full_url();
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request);

            let answer = self
                .script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .or_else(|| self.fallback.clone())
                .unwrap_or_else(|| Err(TransportError::new(format!("no scripted response for {url}"))));
            let delay = self.delay;

            Box::pin(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                answer
            })
        }
    }
}

/// Recording of emitted actions
pub mod recorder {
    use phasewire_core::action::Action;
    use phasewire_core::reducer::Reducer;
    use phasewire_runtime::Store;
    use std::time::Duration;
    use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

    /// Collects the actions a store reduces
    ///
    /// Subscribe before dispatching; actions reduced earlier are not seen.
    #[derive(Debug)]
    pub struct ActionRecorder<S> {
        rx: broadcast::Receiver<Action<S>>,
    }

    impl<S> ActionRecorder<S> {
        /// Record from an existing subscription
        #[must_use]
        pub const fn new(rx: broadcast::Receiver<Action<S>>) -> Self {
            Self { rx }
        }

        /// Record everything `store` reduces from now on
        #[must_use]
        pub fn attach<R>(store: &Store<S, R>) -> Self
        where
            R: Reducer<State = S, Action = Action<S>> + Send + Sync + 'static,
            S: Clone + Send + Sync + 'static,
        {
            Self::new(store.subscribe_actions())
        }

        /// Next recorded action, or `None` after `timeout`
        pub async fn next(&mut self, timeout: Duration) -> Option<Action<S>> {
            tokio::time::timeout(timeout, async {
                loop {
                    match self.rx.recv().await {
                        Ok(action) => return Some(action),
                        Err(RecvError::Lagged(_)) => {},
                        Err(RecvError::Closed) => return None,
                    }
                }
            })
            .await
            .ok()
            .flatten()
        }

        /// Collect actions until one matches `predicate`, inclusive
        ///
        /// Returns whatever was collected if `timeout` expires first.
        pub async fn collect_until<F>(&mut self, predicate: F, timeout: Duration) -> Vec<Action<S>>
        where
            F: Fn(&Action<S>) -> bool,
        {
            let deadline = tokio::time::Instant::now() + timeout;
            let mut collected = Vec::new();

            while let Some(action) = self
                .next(deadline.saturating_duration_since(tokio::time::Instant::now()))
                .await
            {
                let done = predicate(&action);
                collected.push(action);
                if done {
                    break;
                }
            }

            collected
        }

        /// Everything recorded and not yet consumed
        #[must_use]
        pub fn drain(&mut self) -> Vec<Action<S>> {
            let mut drained = Vec::new();
            loop {
                match self.rx.try_recv() {
                    Ok(action) => drained.push(action),
                    Err(TryRecvError::Lagged(_)) => {},
                    Err(TryRecvError::Empty | TryRecvError::Closed) => return drained,
                }
            }
        }
    }
}

/// Test helpers
pub mod helpers {
    /// Install a `tracing` subscriber that writes through the test harness
    ///
    /// Honors `RUST_LOG`; defaults to `phasewire_runtime=debug`. Safe to
    /// call from every test.
    pub fn init_tracing() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "phasewire_runtime=debug,phasewire_core=debug".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::init_tracing;
pub use mocks::MockTransport;
pub use recorder::ActionRecorder;
