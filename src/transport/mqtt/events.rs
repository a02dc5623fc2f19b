//! Routing decisions for raw MQTT events

use crate::transport::Message;
use rumqttc::v5::mqttbytes::v5::{Packet, Publish};
use rumqttc::v5::Event;

/// What the event loop should do with an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker accepted the connection
    ConnectionAcknowledged,
    /// Message published on a subscribed topic
    MessageReceived(Message),
    /// Broker closed the session
    Disconnected,
    /// Broker answered a subscribe request
    SubscriptionConfirmed { packet_id: u16, reason_codes: usize },
    /// PingResp, PubAck and friends
    InfrastructureEvent(String),
    /// Outgoing packets need no action
    OutgoingEvent,
}

/// Classify an event from the rumqttc event loop
pub fn route_mqtt_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => EventRoute::ConnectionAcknowledged,
        Event::Incoming(Packet::Publish(publish)) => {
            EventRoute::MessageReceived(message_from_publish(publish))
        }
        Event::Incoming(Packet::Disconnect(_)) => EventRoute::Disconnected,
        Event::Incoming(Packet::SubAck(suback)) => EventRoute::SubscriptionConfirmed {
            packet_id: suback.pkid,
            reason_codes: suback.return_codes.len(),
        },
        Event::Incoming(other) => EventRoute::InfrastructureEvent(format!("{other:?}")),
        Event::Outgoing(_) => EventRoute::OutgoingEvent,
    }
}

/// Convert an incoming publish, carrying over its v5 response topic
pub fn message_from_publish(publish: &Publish) -> Message {
    Message {
        topic: String::from_utf8_lossy(&publish.topic).into_owned(),
        payload: publish.payload.clone(),
        reply_to: publish
            .properties
            .as_ref()
            .and_then(|props| props.response_topic.clone()),
    }
}
