//! Global tracing subscriber setup for the `agent-eval` binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Logs go to stderr so they never interleave with the report on stdout.
/// Only the first call in a process has any effect.
pub fn init_tracing(json: bool, default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

/// Replaces the default panic hook with a single `tracing` event.
///
/// Agent panics are caught and recorded as `Error` results; this keeps the
/// default hook's message and backtrace out of the middle of the report.
pub fn route_panics_to_tracing() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::error!(%location, "panic: {}", panic_payload(info.payload()));
    }));
}

fn panic_payload(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
