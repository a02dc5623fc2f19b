//! Connection strategy
//!
//! Turns a [`ConnectionPlan`] into an open connection through a [`Connector`].

use crate::context::ContextError;
use crate::credentials::{ConnectionPlan, TokenCredentials};
use crate::transport::{redact_url, Connection, TransportError};
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Connection establishment errors
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Connecting to {url} with token credentials failed")]
    Token {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("Resolving context {name:?} failed")]
    ContextResolution {
        name: String,
        #[source]
        source: ContextError,
    },
    #[error("Connecting to {url} via context {name:?} failed")]
    Context {
        name: String,
        url: String,
        #[source]
        source: TransportError,
    },
}

impl ConnectError {
    pub fn token(credentials: &TokenCredentials, source: TransportError) -> Self {
        Self::Token {
            url: redact_url(&credentials.url),
            source,
        }
    }
}

/// Broker-specific connection factory
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `credentials.url` authenticated with the token and seed
    async fn connect_with_token(
        &self,
        credentials: &TokenCredentials,
    ) -> Result<Box<dyn Connection>, ConnectError>;

    /// Resolve the named context and connect with it
    async fn connect_with_context(&self, name: &str) -> Result<Box<dyn Connection>, ConnectError>;
}

/// Carry out a connection plan. No retries happen here.
pub async fn establish<C>(
    connector: &C,
    plan: &ConnectionPlan,
) -> Result<Box<dyn Connection>, ConnectError>
where
    C: Connector + ?Sized,
{
    let conn = match plan {
        ConnectionPlan::TokenAuth(credentials) => {
            info!(strategy = plan.strategy(), "connecting via token credentials");
            connector.connect_with_token(credentials).await?
        }
        ConnectionPlan::ContextAuth { context } => {
            info!(strategy = plan.strategy(), context = %context, "connecting via context");
            connector.connect_with_context(context).await?
        }
    };

    info!(url = %conn.connected_url_redacted(), "connected to broker");
    Ok(conn)
}
