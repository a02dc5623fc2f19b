//! Observability for the broker host
//!
//! Structured logging through `tracing`, plus span macros for lifecycle and
//! handler operations.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

pub use logging::{handler_span, lifecycle_span};
