//! # layoutmap Utilities
//!
//! Shared utilities for the layoutmap workspace, mainly logging setup built
//! on `tracing`.

pub mod logging;

pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingConfig, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
