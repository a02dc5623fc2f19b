//! Top-level error type of the lifecycle manager
//!
//! Every variant names the phase it came from and, for handler failures, which
//! handler failed. Lower-level errors stay reachable through `source()`.

use crate::app::AppState;
use crate::handler::HandlerError;
use crate::strategy::ConnectError;
use crate::transport::TransportError;
use std::error::Error as StdError;
use thiserror::Error;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Provisioning handler #{index} ({kind}) failed")]
    Provision {
        index: usize,
        kind: String,
        #[source]
        source: HandlerError,
    },

    #[error("Connecting to the broker failed")]
    Connect(#[from] ConnectError),

    #[error("Activating handler #{index} ({kind}) failed")]
    HandlerActivation {
        index: usize,
        kind: String,
        #[source]
        source: HandlerError,
    },

    #[error("Deactivating handler #{index} ({kind}) failed")]
    HandlerDeactivation {
        index: usize,
        kind: String,
        #[source]
        source: HandlerError,
    },

    #[error("Closing the connection failed")]
    Close(#[source] TransportError),

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: AppState,
    },
}

impl AppError {
    /// Index of the handler this error is about, if any
    pub fn handler_index(&self) -> Option<usize> {
        match self {
            AppError::Provision { index, .. }
            | AppError::HandlerActivation { index, .. }
            | AppError::HandlerDeactivation { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Result type for lifecycle operations
pub type AppResult<T> = Result<T, AppError>;

/// Render an error and its sources as `outer: inner: innermost`
pub fn error_chain(error: &dyn StdError) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
