//! Logging and metrics.

mod logging;
pub mod metrics;

pub use logging::{init_tracing, try_init_tracing};
pub use metrics::{gather_text, init_metrics};
