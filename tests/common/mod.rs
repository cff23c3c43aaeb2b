//! Shared test setup.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs an env-filtered tracing subscriber once per test binary, so
/// engine log events show up under `RUST_LOG` when a test fails.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
