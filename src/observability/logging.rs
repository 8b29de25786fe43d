//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over the configured level. Output is either
//! human-readable or one JSON object per line.

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Install the global subscriber.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_tracing(level: &str, json: bool) {
    if let Err(e) = try_init_tracing(level, json) {
        panic!("failed to initialize tracing: {e}");
    }
}

/// Install the global subscriber, reporting instead of panicking when one
/// already exists.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn try_init_tracing(
    level: &str,
    json: bool,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default()
            .with(env_filter)
            .with(json_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_thread_names(true);

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    tracing::debug!(level, json, "Tracing initialized");
    Ok(())
}
