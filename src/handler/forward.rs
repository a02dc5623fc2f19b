//! Stream-forwarding handler
//!
//! Subscribes to one or more topic filters and republishes every message
//! payload to a single destination topic.

use super::{Handler, HandlerError, SubscriptionSet, HANDLER_CHANNEL_CAPACITY};
use crate::config::HandlerConfig;
use crate::transport::{Connection, Message, OutboundMessage, Publisher};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Options of a `forward` block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForwardConfig {
    /// Topic filters to listen on
    pub subjects: Vec<String>,
    /// Destination topic
    pub to: String,
    #[serde(default)]
    pub retain: bool,
}

pub struct ForwardHandler {
    config: ForwardConfig,
    active: SubscriptionSet,
}

impl ForwardHandler {
    pub fn new(config: ForwardConfig) -> Result<Self, HandlerError> {
        if config.subjects.is_empty() {
            return Err(HandlerError::InvalidConfig(
                "forward: at least one subject is required".to_string(),
            ));
        }
        if config.to.is_empty() {
            return Err(HandlerError::InvalidConfig(
                "forward: destination topic must not be empty".to_string(),
            ));
        }
        Ok(Self {
            config,
            active: SubscriptionSet::default(),
        })
    }

    pub fn from_config(config: &HandlerConfig) -> Result<Self, HandlerError> {
        Self::new(config.options_as()?)
    }

    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    async fn run(
        mut rx: mpsc::Receiver<Message>,
        publisher: Arc<dyn Publisher>,
        to: String,
        retain: bool,
    ) {
        while let Some(message) = rx.recv().await {
            debug!(from = %message.topic, to = %to, "forwarding message");
            let outbound = OutboundMessage {
                topic: to.clone(),
                payload: message.payload,
                retain,
            };
            if let Err(e) = publisher.publish(outbound).await {
                warn!(to = %to, error = %e, "failed to forward message");
            }
        }
    }
}

#[async_trait]
impl Handler for ForwardHandler {
    async fn subscribe(&mut self, conn: &dyn Connection) -> Result<(), HandlerError> {
        let (tx, rx) = mpsc::channel(HANDLER_CHANNEL_CAPACITY);

        for subject in &self.config.subjects {
            match conn.subscribe(subject, tx.clone()).await {
                Ok(id) => self.active.push(id),
                Err(e) => {
                    // Leave nothing behind the manager doesn't know about
                    if let Err(cleanup) = self.active.release(conn).await {
                        warn!(error = %cleanup, "cleanup after failed subscribe was incomplete");
                    }
                    return Err(e.into());
                }
            }
        }

        let task = tokio::spawn(Self::run(
            rx,
            conn.publisher(),
            self.config.to.clone(),
            self.config.retain,
        ));
        self.active.set_task(task);

        debug!(
            subjects = ?self.config.subjects,
            to = %self.config.to,
            "forward handler subscribed"
        );
        Ok(())
    }

    async fn unsubscribe(&mut self, conn: &dyn Connection) -> Result<(), HandlerError> {
        self.active.release(conn).await?;
        debug!(to = %self.config.to, "forward handler unsubscribed");
        Ok(())
    }
}
