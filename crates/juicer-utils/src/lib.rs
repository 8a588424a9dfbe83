//! # Juicer Utilities
//!
//! Shared utilities and logging for Juicer.
//!
//! The core library only emits `tracing` events; this crate installs the
//! subscriber that decides where they go.

pub mod logging;

pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
