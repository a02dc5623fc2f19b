//! Named connection profiles stored on disk
//!
//! A context is a JSON file `<dir>/<name>.json` describing a broker URL and
//! the credentials to use with it. An empty context name means "whatever is
//! selected", read from `<dir>/selected.txt`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Overrides the context directory
pub const CONTEXT_DIR_ENV: &str = "BROKER_CONTEXT_DIR";
/// File holding the selected context name
pub const SELECTED_FILE: &str = "selected.txt";

const DEFAULT_URL: &str = "mqtt://localhost:1883";

/// Context store errors
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Invalid context name: {0:?}")]
    InvalidName(String),
    #[error("No context selected and none given")]
    NoneSelected,
    #[error("Context {name:?} not found at {}", .path.display())]
    NotFound { name: String, path: PathBuf },
    #[error("Failed to read context file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse context file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A stored connection profile
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextProfile {
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_url")]
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub jwt: Option<String>,
    pub seed: Option<String>,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

/// Credentials a profile resolves to
#[derive(Clone, PartialEq, Eq)]
pub enum ProfileAuth {
    Anonymous,
    UserPassword { user: String, password: String },
    Token(String),
    JwtAndSeed { jwt: String, seed: String },
}

impl fmt::Debug for ProfileAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileAuth::Anonymous => write!(f, "Anonymous"),
            ProfileAuth::UserPassword { user, .. } => write!(f, "UserPassword({user}, ***)"),
            ProfileAuth::Token(_) => write!(f, "Token(***)"),
            ProfileAuth::JwtAndSeed { .. } => write!(f, "JwtAndSeed(***)"),
        }
    }
}

impl ContextProfile {
    /// Pick credentials: jwt+seed, then user+password, then bare token
    pub fn auth(&self) -> ProfileAuth {
        if let (Some(jwt), Some(seed)) = (&self.jwt, &self.seed) {
            return ProfileAuth::JwtAndSeed {
                jwt: jwt.clone(),
                seed: seed.clone(),
            };
        }
        if let Some(user) = &self.user {
            return ProfileAuth::UserPassword {
                user: user.clone(),
                password: self.password.clone().unwrap_or_default(),
            };
        }
        match &self.token {
            Some(token) => ProfileAuth::Token(token.clone()),
            None => ProfileAuth::Anonymous,
        }
    }
}

impl fmt::Debug for ContextProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextProfile")
            .field("description", &self.description)
            .field("url", &crate::transport::redact_url(&self.url))
            .field("auth", &self.auth())
            .finish()
    }
}

/// Directory of named profiles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStore {
    dir: PathBuf,
}

impl ContextStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$BROKER_CONTEXT_DIR`, else the XDG config dir, else `~/.config`
    pub fn default_location() -> Self {
        Self::new(Self::default_dir_from(|name| std::env::var(name).ok()))
    }

    fn default_dir_from<F>(lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(CONTEXT_DIR_ENV).filter(|d| !d.is_empty()) {
            return PathBuf::from(dir);
        }
        let config_home = lookup("XDG_CONFIG_HOME")
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                PathBuf::from(lookup("HOME").unwrap_or_else(|| ".".to_string())).join(".config")
            });
        config_home.join("broker").join("context")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name of the selected context, if one is recorded
    pub fn selected(&self) -> Result<Option<String>, ContextError> {
        let path = self.dir.join(SELECTED_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let name = content.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ContextError::Read { path, source }),
        }
    }

    /// Load a profile by name; an empty name loads the selected one
    pub fn load(&self, name: &str) -> Result<(String, ContextProfile), ContextError> {
        let name = if name.is_empty() {
            self.selected()?.ok_or(ContextError::NoneSelected)?
        } else {
            name.to_string()
        };
        validate_context_name(&name)?;

        let path = self.dir.join(format!("{name}.json"));
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ContextError::NotFound { name, path });
            }
            Err(source) => return Err(ContextError::Read { path, source }),
        };
        let profile = serde_json::from_str(&content)
            .map_err(|source| ContextError::Parse { path, source })?;

        Ok((name, profile))
    }
}

fn validate_context_name(name: &str) -> Result<(), ContextError> {
    if name.is_empty() || name.starts_with('.') || name.contains('/') || name.contains('\\') {
        return Err(ContextError::InvalidName(name.to_string()));
    }
    Ok(())
}
