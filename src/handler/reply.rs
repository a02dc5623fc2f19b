//! Request-reply responder
//!
//! Answers every request on a topic filter with a fixed body, published to
//! the request's response topic.

use super::{Handler, HandlerError, SubscriptionSet, HANDLER_CHANNEL_CAPACITY};
use crate::config::HandlerConfig;
use crate::transport::{Connection, Message, OutboundMessage, Publisher};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Options of a `reply` block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyConfig {
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

pub struct ReplyHandler {
    config: ReplyConfig,
    active: SubscriptionSet,
}

impl ReplyHandler {
    pub fn new(config: ReplyConfig) -> Result<Self, HandlerError> {
        if config.subject.is_empty() {
            return Err(HandlerError::InvalidConfig(
                "reply: subject must not be empty".to_string(),
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

    async fn run(mut rx: mpsc::Receiver<Message>, publisher: Arc<dyn Publisher>, body: Bytes) {
        while let Some(request) = rx.recv().await {
            let Some(reply_to) = request.reply_to else {
                debug!(topic = %request.topic, "request has no response topic, skipping");
                continue;
            };
            if let Err(e) = publisher
                .publish(OutboundMessage::new(reply_to.clone(), body.clone()))
                .await
            {
                warn!(reply_to = %reply_to, error = %e, "failed to send reply");
            }
        }
    }
}

#[async_trait]
impl Handler for ReplyHandler {
    async fn subscribe(&mut self, conn: &dyn Connection) -> Result<(), HandlerError> {
        let (tx, rx) = mpsc::channel(HANDLER_CHANNEL_CAPACITY);
        let id = conn.subscribe(&self.config.subject, tx).await?;
        self.active.push(id);

        let body = Bytes::from(self.config.body.clone());
        self.active
            .set_task(tokio::spawn(Self::run(rx, conn.publisher(), body)));

        debug!(subject = %self.config.subject, "reply handler subscribed");
        Ok(())
    }

    async fn unsubscribe(&mut self, conn: &dyn Connection) -> Result<(), HandlerError> {
        self.active.release(conn).await?;
        debug!(subject = %self.config.subject, "reply handler unsubscribed");
        Ok(())
    }
}
