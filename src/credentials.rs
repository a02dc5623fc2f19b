//! Credential resolution
//!
//! Decides between token-based and context-based connection from a one-time
//! snapshot of three environment slots. The host takes the snapshot at the
//! call site and hands it to [`crate::App::start`].

use std::fmt;

/// Environment variable holding the broker URL
pub const URL_ENV: &str = "BROKER_URL";
/// Environment variable holding the signed user token
pub const TOKEN_ENV: &str = "BROKER_JWT";
/// Environment variable holding the signing seed
pub const SEED_ENV: &str = "BROKER_SEED";

/// Snapshot of the credential environment slots
///
/// A slot is present when the variable is set, even to an empty string.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub url: Option<String>,
    pub token: Option<String>,
    pub seed: Option<String>,
}

impl Credentials {
    /// Read the three slots from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var_os(name).and_then(|value| value.into_string().ok()))
    }

    /// Read the three slots through an arbitrary lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            url: lookup(URL_ENV),
            token: lookup(TOKEN_ENV),
            seed: lookup(SEED_ENV),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url.as_deref().map(crate::transport::redact_url))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("seed", &self.seed.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Complete token credential set
#[derive(Clone, PartialEq, Eq)]
pub struct TokenCredentials {
    pub url: String,
    pub token: String,
    pub seed: String,
}

impl fmt::Debug for TokenCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCredentials")
            .field("url", &crate::transport::redact_url(&self.url))
            .field("token", &"***")
            .field("seed", &"***")
            .finish()
    }
}

/// Resolved authentication strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionPlan {
    TokenAuth(TokenCredentials),
    ContextAuth { context: String },
}

impl ConnectionPlan {
    /// Short strategy name used in diagnostics
    pub fn strategy(&self) -> &'static str {
        match self {
            ConnectionPlan::TokenAuth(_) => "token",
            ConnectionPlan::ContextAuth { .. } => "context",
        }
    }
}

/// Pick the connection plan: token auth iff all three slots are present
pub fn resolve(credentials: &Credentials, context: &str) -> ConnectionPlan {
    match (&credentials.url, &credentials.token, &credentials.seed) {
        (Some(url), Some(token), Some(seed)) => ConnectionPlan::TokenAuth(TokenCredentials {
            url: url.clone(),
            token: token.clone(),
            seed: seed.clone(),
        }),
        _ => ConnectionPlan::ContextAuth {
            context: context.to_string(),
        },
    }
}
