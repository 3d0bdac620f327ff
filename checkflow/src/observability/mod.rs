//! Logging setup and span helpers.

mod logging;
mod tracing;

pub use self::logging::{init_logging, LogFormat};
pub use self::tracing::{run_span, stage_span, StageTimer};
