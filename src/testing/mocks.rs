//! Mock implementations for testing
//!
//! Provides a mock connector, connection and recording handler so the
//! lifecycle can be exercised without a broker.

use crate::config::HandlerConfig;
use crate::credentials::TokenCredentials;
use crate::handler::{Handler, HandlerError, HandlerRegistry};
use crate::strategy::{ConnectError, Connector};
use crate::transport::mqtt::topic_matches;
use crate::transport::{
    redact_url, Connection, Message, OutboundMessage, Publisher, SubscriptionId, TransportError,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Handler kind registered by [`RecordingHandler::register`]
pub const RECORDING_KIND: &str = "recording";

#[derive(Debug, Default)]
struct ConnectionLog {
    subscriptions: Mutex<BTreeMap<SubscriptionId, (String, mpsc::Sender<Message>)>>,
    subscribed_filters: Mutex<Vec<String>>,
    unsubscribed: Mutex<Vec<SubscriptionId>>,
    published: Mutex<Vec<OutboundMessage>>,
    next_id: AtomicU64,
    successful_subscribes: AtomicUsize,
    close_count: AtomicUsize,
}

/// Mock connection; clones share the same recorded state
#[derive(Debug, Clone)]
pub struct MockConnection {
    url: String,
    fail_subscribe_after: Option<usize>,
    fail_unsubscribe: bool,
    fail_close: bool,
    log: Arc<ConnectionLog>,
}

impl MockConnection {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            fail_subscribe_after: None,
            fail_unsubscribe: false,
            fail_close: false,
            log: Arc::new(ConnectionLog::default()),
        }
    }

    /// Let `successes` subscribes through, fail every one after that
    pub fn fail_subscribe_after(mut self, successes: usize) -> Self {
        self.fail_subscribe_after = Some(successes);
        self
    }

    pub fn with_unsubscribe_failure(mut self) -> Self {
        self.fail_unsubscribe = true;
        self
    }

    pub fn with_close_failure(mut self) -> Self {
        self.fail_close = true;
        self
    }

    fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn close_count(&self) -> usize {
        self.log.close_count.load(Ordering::SeqCst)
    }

    pub async fn subscribed_filters(&self) -> Vec<String> {
        self.log.subscribed_filters.lock().await.clone()
    }

    pub async fn active_subscriptions(&self) -> usize {
        self.log.subscriptions.lock().await.len()
    }

    pub async fn unsubscribe_count(&self) -> usize {
        self.log.unsubscribed.lock().await.len()
    }

    pub async fn published(&self) -> Vec<OutboundMessage> {
        self.log.published.lock().await.clone()
    }

    /// Wait until at least `count` messages were published or `timeout` passes
    pub async fn wait_for_published(&self, count: usize, timeout: Duration) -> Vec<OutboundMessage> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let published = self.published().await;
            if published.len() >= count || tokio::time::Instant::now() >= deadline {
                return published;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Push a message to every matching subscription; returns how many got it
    pub async fn deliver(&self, message: Message) -> usize {
        let sinks: Vec<mpsc::Sender<Message>> = self
            .log
            .subscriptions
            .lock()
            .await
            .values()
            .filter(|(filter, _)| topic_matches(filter, &message.topic))
            .map(|(_, sink)| sink.clone())
            .collect();

        let mut delivered = 0;
        for sink in sinks {
            if sink.send(message.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

struct MockPublisher {
    log: Arc<ConnectionLog>,
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.log.published.lock().await.push(message);
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn connected_url_redacted(&self) -> String {
        redact_url(&self.url)
    }

    fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::new(MockPublisher {
            log: self.log.clone(),
        })
    }

    async fn subscribe(
        &self,
        filter: &str,
        sink: mpsc::Sender<Message>,
    ) -> Result<SubscriptionId, TransportError> {
        if let Some(limit) = self.fail_subscribe_after {
            if self.log.successful_subscribes.load(Ordering::SeqCst) >= limit {
                return Err(TransportError::SubscribeFailed {
                    filter: filter.to_string(),
                    source: "Mock subscribe failure".into(),
                });
            }
        }

        let id = SubscriptionId(self.log.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.log
            .subscriptions
            .lock()
            .await
            .insert(id, (filter.to_string(), sink));
        self.log
            .subscribed_filters
            .lock()
            .await
            .push(filter.to_string());
        self.log.successful_subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        self.log.unsubscribed.lock().await.push(id);
        if self.fail_unsubscribe {
            return Err(TransportError::UnsubscribeFailed {
                id,
                source: "Mock unsubscribe failure".into(),
            });
        }
        match self.log.subscriptions.lock().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(TransportError::UnknownSubscription(id)),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.log.close_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(TransportError::ConnectionFailed(
                "Mock close failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which strategy a connector was asked to use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectCall {
    Token { url: String },
    Context { name: String },
}

/// Mock connector handing out clones of one [`MockConnection`]
#[derive(Debug)]
pub struct MockConnector {
    calls: Arc<Mutex<Vec<ConnectCall>>>,
    connection: MockConnection,
    pub should_fail: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::with_connection(MockConnection::new("mqtt://localhost:1883"))
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    pub fn with_connection(connection: MockConnection) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            connection,
            should_fail: false,
        }
    }

    /// The connection every successful connect returns a clone of
    pub fn connection(&self) -> &MockConnection {
        &self.connection
    }

    pub async fn calls(&self) -> Vec<ConnectCall> {
        self.calls.lock().await.clone()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect_with_token(
        &self,
        credentials: &TokenCredentials,
    ) -> Result<Box<dyn Connection>, ConnectError> {
        self.calls.lock().await.push(ConnectCall::Token {
            url: credentials.url.clone(),
        });
        if self.should_fail {
            return Err(ConnectError::token(
                credentials,
                TransportError::ConnectionFailed("Mock connection failure".to_string()),
            ));
        }
        Ok(Box::new(self.connection.clone().with_url(&credentials.url)))
    }

    async fn connect_with_context(&self, name: &str) -> Result<Box<dyn Connection>, ConnectError> {
        self.calls.lock().await.push(ConnectCall::Context {
            name: name.to_string(),
        });
        if self.should_fail {
            return Err(ConnectError::Context {
                name: name.to_string(),
                url: self.connection.connected_url_redacted(),
                source: TransportError::ConnectionFailed("Mock connection failure".to_string()),
            });
        }
        Ok(Box::new(self.connection.clone()))
    }
}

/// One recorded handler operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerCall {
    Subscribe(String),
    Unsubscribe(String),
}

/// Call log shared by every recording handler of a test
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<HandlerCall>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, call: HandlerCall) {
        self.0.lock().await.push(call);
    }

    pub async fn calls(&self) -> Vec<HandlerCall> {
        self.0.lock().await.clone()
    }

    pub async fn subscribes(&self) -> Vec<String> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                HandlerCall::Subscribe(name) => Some(name),
                HandlerCall::Unsubscribe(_) => None,
            })
            .collect()
    }

    pub async fn unsubscribes(&self) -> Vec<String> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                HandlerCall::Unsubscribe(name) => Some(name),
                HandlerCall::Subscribe(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RecordingOptions {
    name: String,
    #[serde(default)]
    fail_subscribe: bool,
    #[serde(default)]
    fail_unsubscribe: bool,
}

/// Handler that records its calls and fails on demand
#[derive(Debug, Clone)]
pub struct RecordingHandler {
    pub name: String,
    pub fail_subscribe: bool,
    pub fail_unsubscribe: bool,
    log: CallLog,
}

impl RecordingHandler {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            fail_subscribe: false,
            fail_unsubscribe: false,
            log: log.clone(),
        }
    }

    /// Register the `recording` kind; options: `name`, `fail_subscribe`, `fail_unsubscribe`
    pub fn register(registry: &mut HandlerRegistry, log: &CallLog) {
        let log = log.clone();
        registry.register(RECORDING_KIND, move |config: &HandlerConfig| {
            let options: RecordingOptions = config.options_as()?;
            Ok(Box::new(RecordingHandler {
                name: options.name,
                fail_subscribe: options.fail_subscribe,
                fail_unsubscribe: options.fail_unsubscribe,
                log: log.clone(),
            }) as Box<dyn Handler>)
        });
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn subscribe(&mut self, _conn: &dyn Connection) -> Result<(), HandlerError> {
        self.log
            .record(HandlerCall::Subscribe(self.name.clone()))
            .await;
        if self.fail_subscribe {
            return Err(HandlerError::Failed(format!("{} subscribe failed", self.name)));
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, _conn: &dyn Connection) -> Result<(), HandlerError> {
        self.log
            .record(HandlerCall::Unsubscribe(self.name.clone()))
            .await;
        if self.fail_unsubscribe {
            return Err(HandlerError::Failed(format!(
                "{} unsubscribe failed",
                self.name
            )));
        }
        Ok(())
    }
}
