//! Lifecycle manager
//!
//! [`App`] owns the broker connection and drives every configured handler
//! through it. The host calls [`App::provision`], [`App::start`] and
//! [`App::stop`] once each, in that order.
//!
//! Handlers are activated and deactivated one at a time in configuration
//! order; deactivation is not reversed. A handler failure during start is
//! returned immediately without rolling back earlier handlers, leaving the app
//! `Running` with its connection so that `stop` can release everything.

use crate::config::AppConfig;
use crate::credentials::{self, Credentials};
use crate::error::{AppError, AppResult};
use crate::handler::{Handler, HandlerRegistry};
use crate::observability::{handler_span, lifecycle_span};
use crate::strategy::{self, Connector};
use crate::transport::Connection;
use std::fmt;
use tracing::{debug, info, warn, Instrument};

/// Lifecycle states; there is no way back to an earlier one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Unprovisioned,
    Provisioned,
    Running,
    Stopped,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppState::Unprovisioned => "unprovisioned",
            AppState::Provisioned => "provisioned",
            AppState::Running => "running",
            AppState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

struct ProvisionedHandler {
    kind: String,
    handler: Box<dyn Handler>,
}

/// Connection lifecycle manager
pub struct App<C: Connector> {
    connector: C,
    state: AppState,
    context: String,
    handlers: Vec<ProvisionedHandler>,
    /// Present exactly while `Running`
    connection: Option<Box<dyn Connection>>,
}

impl<C: Connector> App<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            state: AppState::Unprovisioned,
            context: String::new(),
            handlers: Vec::new(),
            connection: None,
        }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    /// Context name used when token credentials are incomplete
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Handler kinds in activation order
    pub fn handler_kinds(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.kind.as_str()).collect()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn require(&self, operation: &'static str, expected: &[AppState]) -> AppResult<()> {
        if expected.contains(&self.state) {
            Ok(())
        } else {
            Err(AppError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Record the context and build every handler in declared order
    ///
    /// On the first factory failure nothing is kept and the app stays
    /// `Unprovisioned`.
    pub async fn provision(
        &mut self,
        config: &AppConfig,
        registry: &HandlerRegistry,
    ) -> AppResult<()> {
        self.require("provision", &[AppState::Unprovisioned])?;
        async {
            let mut handlers = Vec::with_capacity(config.handlers.len());
            for (index, handler_config) in config.handlers.iter().enumerate() {
                let handler = registry
                    .build(handler_config)
                    .map_err(|source| AppError::Provision {
                        index,
                        kind: handler_config.handler.clone(),
                        source,
                    })?;
                debug!(index, kind = %handler_config.handler, "handler provisioned");
                handlers.push(ProvisionedHandler {
                    kind: handler_config.handler.clone(),
                    handler,
                });
            }

            self.context = config.context.clone();
            self.handlers = handlers;
            self.state = AppState::Provisioned;
            debug!(
                context = %self.context,
                handlers = self.handlers.len(),
                "provisioned"
            );
            Ok::<(), AppError>(())
        }
        .instrument(lifecycle_span!(
            operation = "provision",
            handlers = config.handlers.len()
        ))
        .await
    }

    /// Connect and activate every handler in order
    pub async fn start(&mut self, credentials: &Credentials) -> AppResult<()> {
        self.require("start", &[AppState::Provisioned])?;
        async {
            let plan = credentials::resolve(credentials, &self.context);

            // Nothing is touched and the state stays Provisioned on failure
            let connection = strategy::establish(&self.connector, &plan).await?;
            let connection = self.connection.insert(connection);
            self.state = AppState::Running;

            for (index, entry) in self.handlers.iter_mut().enumerate() {
                entry
                    .handler
                    .subscribe(connection.as_ref())
                    .instrument(handler_span!(operation = "subscribe", index, kind = %entry.kind))
                    .await
                    .map_err(|source| AppError::HandlerActivation {
                        index,
                        kind: entry.kind.clone(),
                        source,
                    })?;
                debug!(index, kind = %entry.kind, "handler activated");
            }

            debug!(handlers = self.handlers.len(), "started");
            Ok::<(), AppError>(())
        }
        .instrument(lifecycle_span!(operation = "start"))
        .await
    }

    /// Deactivate handlers in order, then close the connection
    ///
    /// The first handler failure ends deactivation; the connection is closed
    /// either way and the handler error takes precedence over a close error.
    /// After a start that never connected there is nothing to release.
    pub async fn stop(&mut self) -> AppResult<()> {
        self.require("stop", &[AppState::Provisioned, AppState::Running])?;
        self.state = AppState::Stopped;

        let Some(connection) = self.connection.take() else {
            debug!("stopped without a connection");
            return Ok(());
        };

        async {
            info!(url = %connection.connected_url_redacted(), "closing broker connection");

            let deactivation = self.deactivate(connection.as_ref()).await;
            let close = connection.close().await;

            match (deactivation, close) {
                (Err(e), Err(close_err)) => {
                    warn!(error = %close_err, "closing the connection also failed");
                    Err(e)
                }
                (Err(e), Ok(())) => Err(e),
                (Ok(()), Err(close_err)) => Err(AppError::Close(close_err)),
                (Ok(()), Ok(())) => {
                    debug!("stopped");
                    Ok(())
                }
            }
        }
        .instrument(lifecycle_span!(operation = "stop"))
        .await
    }

    async fn deactivate(&mut self, connection: &dyn Connection) -> AppResult<()> {
        for (index, entry) in self.handlers.iter_mut().enumerate() {
            entry
                .handler
                .unsubscribe(connection)
                .instrument(handler_span!(operation = "unsubscribe", index, kind = %entry.kind))
                .await
                .map_err(|source| AppError::HandlerDeactivation {
                    index,
                    kind: entry.kind.clone(),
                    source,
                })?;
            debug!(index, kind = %entry.kind, "handler deactivated");
        }
        Ok(())
    }
}
