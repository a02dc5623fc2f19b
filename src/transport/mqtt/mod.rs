//! MQTT v5 transport
//!
//! Split the same way as the rest of the transport layer: pure pieces first,
//! I/O last.
//!
//! - [`connection`] - option building, backoff, topic filter matching
//! - [`events`] - routing of raw event loop events
//! - [`subscriptions`] - local subscription table
//! - [`client`] - the event loop supervisor and [`MqttConnection`]
//! - [`connector`] - [`MqttConnector`], the production [`crate::strategy::Connector`]
//!
//! # Usage
//!
//! ```rust,no_run
//! use broker_host::config::ConnectionSection;
//! use broker_host::context::ContextStore;
//! use broker_host::credentials::TokenCredentials;
//! use broker_host::strategy::Connector;
//! use broker_host::transport::mqtt::MqttConnector;
//!
//! # tokio_test::block_on(async {
//! let connector = MqttConnector::new(
//!     ContextStore::default_location(),
//!     ConnectionSection::default(),
//! );
//! let creds = TokenCredentials {
//!     url: "mqtt://localhost:1883".to_string(),
//!     token: "token".to_string(),
//!     seed: "seed".to_string(),
//! };
//! let conn = connector.connect_with_token(&creds).await?;
//! conn.close().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod connector;
pub mod events;
pub mod subscriptions;

pub use client::{MqttConnection, MqttPublisher};
pub use connection::{
    configure_mqtt_options, parse_broker_url, topic_matches, BrokerAddress, ConnectionState,
    MqttCredentials, ReconnectConfig,
};
pub use connector::MqttConnector;
pub use events::{route_mqtt_event, EventRoute};
pub use subscriptions::SubscriptionTable;
