//! Broker host
//!
//! Keeps one long-lived connection to a publish/subscribe broker and drives a
//! set of pluggable handlers through that connection's lifecycle.
//!
//! # Overview
//!
//! - [`credentials`] - picks token or context authentication from the environment
//! - [`strategy`] - turns that choice into an open connection
//! - [`handler`] - the subscribe/unsubscribe contract, registry and builtins
//! - [`app`] - the Provision, Start, Stop lifecycle
//! - [`transport`] - connection traits and the MQTT implementation
//!
//! # Quick Start
//!
//! ```rust
//! use broker_host::testing::MockConnector;
//! use broker_host::{App, AppConfig, AppState, Credentials, HandlerRegistry};
//!
//! # tokio_test::block_on(async {
//! let config = AppConfig::from_toml_str(r#"
//! [[handle]]
//! handler = "reply"
//! subject = "svc/ping"
//! body = "pong"
//! "#)?;
//!
//! let credentials = Credentials::from_lookup(|name| match name {
//!     "BROKER_URL" => Some("mqtt://localhost:1883".to_string()),
//!     "BROKER_JWT" => Some("token".to_string()),
//!     "BROKER_SEED" => Some("seed".to_string()),
//!     _ => None,
//! });
//!
//! let mut app = App::new(MockConnector::new());
//! app.provision(&config, &HandlerRegistry::with_builtins()).await?;
//! app.start(&credentials).await?;
//! assert_eq!(app.state(), AppState::Running);
//! app.stop().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

pub mod app;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod handler;
pub mod observability;
pub mod strategy;
pub mod testing;
pub mod transport;

pub use app::{App, AppState};
pub use config::{AppConfig, ConfigError, ConnectionSection, HandlerConfig};
pub use credentials::{resolve, ConnectionPlan, Credentials, TokenCredentials};
pub use error::{AppError, AppResult};
pub use handler::{Handler, HandlerError, HandlerRegistry};
pub use strategy::{establish, ConnectError, Connector};
pub use transport::mqtt::MqttConnector;
pub use transport::{Connection, Message, OutboundMessage, Publisher, TransportError};
