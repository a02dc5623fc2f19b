//! Handler contract and registry
//!
//! A handler is a pluggable component that, given an open connection, creates
//! its own subscriptions and later tears them down. The registry turns tagged
//! `[[handle]]` configuration blocks into handler instances.

use crate::config::HandlerConfig;
use crate::transport::{Connection, SubscriptionId, TransportError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub mod forward;
pub mod reply;

pub use forward::{ForwardConfig, ForwardHandler};
pub use reply::{ReplyConfig, ReplyHandler};

/// Buffer size of the channel between a connection and a handler task
pub const HANDLER_CHANNEL_CAPACITY: usize = 64;

/// The two operations every handler exposes
///
/// The manager calls `subscribe` at most once per start. During stop it calls
/// `unsubscribe` on every handler, including ones whose `subscribe` failed or
/// never ran, so releasing nothing must succeed. A handler that fails partway
/// through `subscribe` must release what it already created before returning
/// the error.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn subscribe(&mut self, conn: &dyn Connection) -> Result<(), HandlerError>;

    async fn unsubscribe(&mut self, conn: &dyn Connection) -> Result<(), HandlerError>;
}

/// Handler errors
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Unknown handler: {0}")]
    UnknownHandler(String),
    #[error("Invalid handler configuration: {0}")]
    InvalidConfig(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Handler failed: {0}")]
    Failed(String),
}

impl HandlerConfig {
    /// Decode the handler-specific options into a typed config
    pub fn options_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_value(serde_json::Value::Object(self.options.clone()))
            .map_err(|e| HandlerError::InvalidConfig(format!("{}: {e}", self.handler)))
    }
}

/// Builds a handler instance from its configuration block
pub type HandlerFactory =
    Arc<dyn Fn(&HandlerConfig) -> Result<Box<dyn Handler>, HandlerError> + Send + Sync>;

/// Maps a handler discriminator to its factory
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `forward` and `reply` registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("forward", |config| {
            Ok(Box::new(ForwardHandler::from_config(config)?) as Box<dyn Handler>)
        });
        registry.register("reply", |config| {
            Ok(Box::new(ReplyHandler::from_config(config)?) as Box<dyn Handler>)
        });
        registry
    }

    /// Register a factory, replacing any previous one for `kind`
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&HandlerConfig) -> Result<Box<dyn Handler>, HandlerError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered discriminators, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Instantiate the handler a configuration block names
    pub fn build(&self, config: &HandlerConfig) -> Result<Box<dyn Handler>, HandlerError> {
        let factory = self
            .factories
            .get(&config.handler)
            .ok_or_else(|| HandlerError::UnknownHandler(config.handler.clone()))?;
        factory(config)
    }
}

/// Subscriptions and the forwarding task owned by one active handler
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<SubscriptionId>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionSet {
    pub fn push(&mut self, id: SubscriptionId) {
        self.subscriptions.push(id);
    }

    pub fn set_task(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty() && self.task.is_none()
    }

    /// Stop the task and release every subscription, reporting the first failure
    pub async fn release(&mut self, conn: &dyn Connection) -> Result<(), TransportError> {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let mut first_error = None;
        for id in std::mem::take(&mut self.subscriptions) {
            match conn.unsubscribe(id).await {
                Ok(()) => debug!(subscription = %id, "released subscription"),
                Err(e) => {
                    warn!(subscription = %id, error = %e, "failed to release subscription");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(handler: &str, options: serde_json::Value) -> HandlerConfig {
        HandlerConfig {
            handler: handler.to_string(),
            options: options.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = HandlerRegistry::with_builtins();
        assert_eq!(registry.kinds(), vec!["forward", "reply"]);
        assert!(registry.contains("forward"));
        assert!(!registry.contains("http"));
    }

    #[test]
    fn test_unknown_handler() {
        let registry = HandlerRegistry::with_builtins();
        let result = registry.build(&config("bogus", json!({})));
        assert!(matches!(result, Err(HandlerError::UnknownHandler(kind)) if kind == "bogus"));
    }

    #[test]
    fn test_build_forward_handler() {
        let registry = HandlerRegistry::with_builtins();
        let result = registry.build(&config(
            "forward",
            json!({"subjects": ["in/+"], "to": "out"}),
        ));
        assert!(result.is_ok());
    }

    #[test]
    fn test_factory_error_propagates() {
        let registry = HandlerRegistry::with_builtins();
        let result = registry.build(&config("forward", json!({"to": "out"})));
        assert!(matches!(result, Err(HandlerError::InvalidConfig(_))));
    }

    #[test]
    fn test_register_replaces_factory() {
        let mut registry = HandlerRegistry::with_builtins();
        registry.register("forward", |_| Err(HandlerError::Failed("disabled".to_string())));

        let result = registry.build(&config(
            "forward",
            json!({"subjects": ["in"], "to": "out"}),
        ));
        assert!(matches!(result, Err(HandlerError::Failed(_))));
    }

    #[test]
    fn test_options_as_reports_handler_kind() {
        let err = config("reply", json!({"subject": 5}))
            .options_as::<ReplyConfig>()
            .err()
            .unwrap();
        assert!(err.to_string().contains("reply"));
    }
}
