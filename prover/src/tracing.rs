use tracing_subscriber::{prelude::*, util::SubscriberInitExt, EnvFilter};

/// Directive used when `RUST_LOG` is unset or unparsable.
const DEFAULT_FILTER: &str = "rollup_prover=info,prover=info";

/// Installs the global subscriber. Must be called once, before any task is
/// spawned.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(filter),
        )
        .init();
}
