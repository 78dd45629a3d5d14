use tracing_subscriber::EnvFilter;

/// Per-test log capture routed through the test harness writer
pub struct TestTracing {
    _guard: tracing::subscriber::DefaultGuard,
}

impl TestTracing {
    pub fn init() -> Self {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("brrtdispatch=debug"))
            .with_test_writer()
            .with_thread_names(true)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        Self { _guard: guard }
    }
}
