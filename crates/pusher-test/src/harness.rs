//! Test harness helpers.

use std::future::Future;
use std::time::Duration;

/// Default bound for [`within`].
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test-friendly tracing subscriber. Safe to call repeatedly.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_test_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Await `fut`, failing the test if it takes longer than [`TEST_TIMEOUT`].
///
/// # Panics
///
/// Panics on timeout.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, fut)
        .await
        .expect("operation timed out")
}
