//! Todos example binary
//!
//! Loads and creates todos against a JSON placeholder API.
//!
//! ```bash
//! PHASEWIRE_BASE_URL=https://jsonplaceholder.typicode.com cargo run -p todos
//! ```
//!
//! Set `PHASEWIRE_METRICS=1` to print the Prometheus exposition at exit.

use phasewire_core::http::Transport;
use phasewire_runtime::metrics::PrometheusMetrics;
use phasewire_runtime::transport::ReqwestTransport;
use phasewire_runtime::{PhaseDispatcher, Store};
use std::sync::Arc;
use std::time::Duration;
use todos::{baseline, create, fetch_all, reducer, sign_in, AppState, TodosSlice};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";
const CALL_TIMEOUT: Duration = Duration::from_secs(15);

fn print_slice(slice: &TodosSlice) {
    match &slice.error {
        Some(failure) => println!("  error (status {}): {}", failure.status, failure.message),
        None => {
            for todo in &slice.items {
                let mark = if todo.completed { "x" } else { " " };
                println!("  [{mark}] #{} {}", todo.id, todo.title);
            }
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todos=debug,phasewire_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = if std::env::var_os("PHASEWIRE_METRICS").is_some() {
        Some(PrometheusMetrics::install()?)
    } else {
        None
    };

    let base_url =
        std::env::var("PHASEWIRE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    tracing::info!(%base_url, "Starting todos example");

    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::with_timeout(Duration::from_secs(10))?);
    let store = Store::new(
        AppState::default(),
        reducer(),
        PhaseDispatcher::new(baseline(base_url), transport),
    );

    println!("=== Todos Example: phasewire ===\n");

    store.dispatch(sign_in("demo-token")).await?;

    println!(">>> Dispatching: FETCH_ALL");
    let mut handle = store.dispatch(fetch_all(5)).await?;
    println!("Loading: {}", store.state(|s| s.todos.loading).await);
    handle.wait_with_timeout(CALL_TIMEOUT).await?;
    print_slice(&store.state(|s| s.todos.clone()).await);

    println!("\n>>> Dispatching: CREATE");
    store
        .dispatch(create("Try phasewire"))
        .await?
        .wait_with_timeout(CALL_TIMEOUT)
        .await?;
    print_slice(&store.state(|s| s.todos.clone()).await);

    store.shutdown(Duration::from_secs(5)).await?;

    if let Some(text) = metrics.as_ref().and_then(PrometheusMetrics::render) {
        println!("\n=== Metrics ===\n{text}");
    }

    Ok(())
}
