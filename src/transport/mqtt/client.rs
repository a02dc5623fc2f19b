//! MQTT connection: the impure half of the transport
//!
//! [`MqttConnection::open`] spawns a supervisor task that drives the rumqttc
//! event loop, routes incoming publishes to subscription sinks, retries with
//! backoff after network errors and resubscribes after every reconnect.

use super::connection::{ConnectionState, ReconnectConfig};
use super::events::{route_mqtt_event, EventRoute};
use super::subscriptions::SubscriptionTable;
use crate::config::ConnectionSection;
use crate::transport::{
    redact_url, Connection, Message, OutboundMessage, Publisher, SubscriptionId, TransportError,
};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, EventLoop, MqttOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the request channel between client handles and the event loop
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// How long close waits for the event loop to flush the DISCONNECT
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Publish handle sharing the connection's request channel
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let topic = message.topic;
        self.client
            .publish(topic.clone(), QoS::AtLeastOnce, message.retain, message.payload)
            .await
            .map_err(|e| TransportError::PublishFailed {
                topic,
                source: Box::new(e),
            })
    }
}

/// State shared by the supervisor task
struct Supervisor {
    client: AsyncClient,
    subscriptions: Arc<Mutex<SubscriptionTable>>,
    state_tx: watch::Sender<ConnectionState>,
    closing: Arc<AtomicBool>,
    reconnect: ReconnectConfig,
    url: String,
}

impl Supervisor {
    async fn run(self, mut event_loop: EventLoop, mut shutdown_rx: watch::Receiver<bool>) {
        debug!(url = %self.url, "MQTT event loop started");
        let mut failures = 0u32;
        let mut acknowledged = false;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("shutdown signal received, stopping event loop");
                        break;
                    }
                }

                event = event_loop.poll() => match event {
                    Ok(event) => {
                        let route = route_mqtt_event(&event);
                        self.process_event_route(route, &mut failures, &mut acknowledged).await;
                    }
                    Err(e) => {
                        if self.closing.load(Ordering::SeqCst) {
                            debug!(error = %e, "event loop ended after disconnect");
                            break;
                        }
                        failures += 1;
                        let reason = e.to_string();
                        let _ = self.state_tx.send(ConnectionState::Disconnected(reason.clone()));

                        let delay_ms = self.reconnect.calculate_backoff_delay(failures);
                        warn!(
                            url = %self.url,
                            error = %reason,
                            attempt = failures,
                            delay_ms,
                            "MQTT connection error, retrying"
                        );
                        if !interruptible_sleep(shutdown_rx.clone(), delay_ms).await {
                            break;
                        }
                    }
                }
            }
        }

        let _ = self.state_tx.send(ConnectionState::Closed);
        debug!(url = %self.url, "MQTT event loop stopped");
    }

    async fn process_event_route(
        &self,
        route: EventRoute,
        failures: &mut u32,
        acknowledged: &mut bool,
    ) {
        match route {
            EventRoute::ConnectionAcknowledged => {
                if *acknowledged {
                    info!(url = %self.url, attempts = *failures, "reconnected to broker");
                    self.resubscribe().await;
                }
                *acknowledged = true;
                *failures = 0;
                let _ = self.state_tx.send(ConnectionState::Connected);
            }
            EventRoute::MessageReceived(message) => self.dispatch(message).await,
            EventRoute::Disconnected => {
                warn!(url = %self.url, "broker closed the session");
                let _ = self
                    .state_tx
                    .send(ConnectionState::Disconnected("broker sent DISCONNECT".to_string()));
            }
            EventRoute::SubscriptionConfirmed {
                packet_id,
                reason_codes,
            } => {
                debug!(packet_id, reason_codes, "subscription acknowledged");
            }
            EventRoute::InfrastructureEvent(event) => debug!(event = %event, "MQTT event"),
            EventRoute::OutgoingEvent => {}
        }
    }

    /// Hand a message to every matching sink without blocking the event loop
    ///
    /// Each received PUBLISH is delivered once per matching subscription; if
    /// the broker sends duplicates for overlapping filters, so does this.
    async fn dispatch(&self, message: Message) {
        let sinks = self.subscriptions.lock().await.sinks_for(&message.topic);
        if sinks.is_empty() {
            debug!(topic = %message.topic, "no subscription for message");
            return;
        }

        for sink in sinks {
            match sink.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(topic = %message.topic, "handler is not keeping up, message dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(topic = %message.topic, "subscription sink closed");
                }
            }
        }
    }

    /// Clean sessions lose subscriptions on reconnect; place them again
    async fn resubscribe(&self) {
        let filters = self.subscriptions.lock().await.filters();
        for filter in filters {
            // try_ variant: the event loop itself drains this channel
            if let Err(e) = self.client.try_subscribe(filter.clone(), QoS::AtLeastOnce) {
                warn!(filter = %filter, error = %e, "failed to resubscribe");
            }
        }
    }
}

/// Sleep unless shutdown is signalled first; false means stop
async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => {
            changed.is_ok() && !*shutdown_rx.borrow()
        }
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
    }
}

/// Wait for the first ConnAck; fails on the first error or after `timeout`
async fn wait_for_connection_confirmation(
    mut state_rx: watch::Receiver<ConnectionState>,
    timeout: Duration,
) -> Result<(), TransportError> {
    let confirmation = tokio::time::timeout(timeout, async {
        loop {
            if state_rx.changed().await.is_err() {
                return Err(TransportError::ConnectionFailed(
                    "event loop stopped before the broker answered".to_string(),
                ));
            }
            match &*state_rx.borrow() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected(reason) => {
                    return Err(TransportError::ConnectionFailed(reason.clone()));
                }
                ConnectionState::Closed => return Err(TransportError::Closed),
                ConnectionState::Connecting => continue,
            }
        }
    })
    .await;

    match confirmation {
        Ok(result) => result,
        Err(_) => Err(TransportError::ConnectTimeout(timeout)),
    }
}

/// Open MQTT connection
pub struct MqttConnection {
    client: AsyncClient,
    url: String,
    subscriptions: Arc<Mutex<SubscriptionTable>>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    closing: Arc<AtomicBool>,
    event_loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MqttConnection {
    /// Connect and wait for the broker's acknowledgement
    pub async fn open(
        options: MqttOptions,
        url: &str,
        settings: &ConnectionSection,
    ) -> Result<Self, TransportError> {
        let url = redact_url(url);
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let subscriptions = Arc::new(Mutex::new(SubscriptionTable::default()));
        let closing = Arc::new(AtomicBool::new(false));

        let supervisor = Supervisor {
            client: client.clone(),
            subscriptions: subscriptions.clone(),
            state_tx,
            closing: closing.clone(),
            reconnect: ReconnectConfig::with_max_delay(settings.max_reconnect_delay_ms),
            url: url.clone(),
        };
        let handle = tokio::spawn(supervisor.run(event_loop, shutdown_rx));

        let connection = Self {
            client,
            url,
            subscriptions,
            state_rx: state_rx.clone(),
            shutdown_tx,
            closing,
            event_loop_handle: Mutex::new(Some(handle)),
        };

        // On failure `connection` drops here and stops the event loop
        wait_for_connection_confirmation(state_rx, settings.connect_timeout()).await?;
        Ok(connection)
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), ConnectionState::Connected)
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MqttConnection {
    fn connected_url_redacted(&self) -> String {
        self.url.clone()
    }

    fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::new(MqttPublisher {
            client: self.client.clone(),
        })
    }

    async fn subscribe(
        &self,
        filter: &str,
        sink: mpsc::Sender<Message>,
    ) -> Result<SubscriptionId, TransportError> {
        self.check_open()?;
        // The table lock is released before waiting on the request channel;
        // the event loop needs it to dispatch while that channel drains.
        let (id, first_for_filter) = self.subscriptions.lock().await.insert(filter, sink);

        if first_for_filter {
            if let Err(e) = self
                .client
                .subscribe(filter.to_string(), QoS::AtLeastOnce)
                .await
            {
                self.subscriptions.lock().await.remove(id);
                return Err(TransportError::SubscribeFailed {
                    filter: filter.to_string(),
                    source: Box::new(e),
                });
            }
        }

        debug!(filter = %filter, id = %id, "subscribed");
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        self.check_open()?;
        let removed = self.subscriptions.lock().await.remove(id);
        let Some((filter, last_for_filter)) = removed else {
            return Err(TransportError::UnknownSubscription(id));
        };

        if last_for_filter {
            self.client
                .unsubscribe(filter.clone())
                .await
                .map_err(|e| TransportError::UnsubscribeFailed {
                    id,
                    source: Box::new(e),
                })?;
        }

        debug!(filter = %filter, id = %id, "unsubscribed");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.subscriptions.lock().await.clear();

        let disconnect = match tokio::time::timeout(SHUTDOWN_GRACE, self.client.disconnect()).await
        {
            Ok(result) => result
                .map_err(|e| TransportError::ConnectionFailed(format!("disconnect failed: {e}"))),
            Err(_) => Err(TransportError::ConnectionFailed(
                "disconnect request timed out".to_string(),
            )),
        };

        if let Some(mut handle) = self.event_loop_handle.lock().await.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                debug!("event loop still running after disconnect, stopping it");
                let _ = self.shutdown_tx.send(true);
                handle.abort();
            }
        }

        disconnect
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Ok(mut guard) = self.event_loop_handle.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
