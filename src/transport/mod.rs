//! Broker transport boundary
//!
//! The lifecycle manager only ever talks to the broker through the traits in
//! this module. The MQTT implementation lives in [`mqtt`]; tests use the mocks
//! in [`crate::testing`].

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

pub mod mqtt;

/// Message delivered to a subscription sink
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
    /// Topic the sender expects a response on, if any
    pub reply_to: Option<String>,
}

/// Message to be published
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: false,
        }
    }
}

/// Identifier of a single subscription on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Transport errors surfaced by connections and connectors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("No connection acknowledgement within {0:?}")]
    ConnectTimeout(std::time::Duration),
    #[error("Publishing to {topic} failed")]
    PublishFailed {
        topic: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Subscribing to {filter} failed")]
    SubscribeFailed {
        filter: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Unsubscribing {id} failed")]
    UnsubscribeFailed {
        id: SubscriptionId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),
    #[error("Connection is closed")]
    Closed,
}

/// Publish-only handle derived from a connection
///
/// Handlers may keep one of these past a single subscribe call, e.g. inside a
/// forwarding task, and must drop it during unsubscribe.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError>;
}

/// An open broker connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Connected URL with credentials removed, safe to log
    fn connected_url_redacted(&self) -> String;

    /// Cloneable publish handle bound to this connection
    fn publisher(&self) -> Arc<dyn Publisher>;

    /// Subscribe to a topic filter; matching messages are sent to `sink`
    async fn subscribe(
        &self,
        filter: &str,
        sink: mpsc::Sender<Message>,
    ) -> Result<SubscriptionId, TransportError>;

    /// Release a subscription created by [`Connection::subscribe`]
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError>;

    /// Close the connection. Called exactly once by the owner.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Strip user info from a broker URL for logging
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if !url.username().is_empty() || url.password().is_some() {
                // cannot-be-a-base URLs refuse credentials, nothing to strip there
                let _ = url.set_username("");
                let _ = url.set_password(None);
            }
            url.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}
