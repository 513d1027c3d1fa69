//! Stored credentials for the backend session.
//!
//! The backend authenticates every request with a bearer token issued at
//! sign-in. The token is kept out of the main config file so the config
//! can be shared or checked in; credentials live in their own file
//! (`~/.config/pairchat/credentials.toml`) or come from the
//! `PAIRCHAT_TOKEN` environment variable, which takes priority.

use std::path::{Path, PathBuf};

/// Errors that can occur when loading credentials.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No token in the environment and no credentials file found.
    #[error("no credentials: set PAIRCHAT_TOKEN or create {0}")]
    Missing(PathBuf),

    /// Failed to read the credentials file.
    #[error("failed to read credentials file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the credentials file.
    #[error("failed to parse credentials file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The stored token is empty.
    #[error("stored token is empty")]
    EmptyToken,
}

/// A bearer token for the backend.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Credentials {
    /// The bearer token sent with every request.
    pub token: String,
}

impl Credentials {
    /// Loads credentials, preferring the `PAIRCHAT_TOKEN` environment
    /// variable over the credentials file.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if neither source yields a non-empty token.
    pub fn load() -> Result<Self, AuthError> {
        if let Ok(token) = std::env::var("PAIRCHAT_TOKEN") {
            return Self::from_token(token);
        }
        let path = default_path();
        Self::from_file(&path)
    }

    /// Wraps a raw token, rejecting empty input.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::EmptyToken`] if the token is blank.
    pub fn from_token(token: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(Self { token })
    }

    /// Loads credentials from a TOML file with a single `token` key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the file is missing, unreadable, or holds
    /// an empty token.
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::Missing(path.to_path_buf()));
            }
            Err(e) => {
                return Err(AuthError::ReadFile {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        let creds: Self = toml::from_str(&contents)?;
        if creds.token.trim().is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(creds)
    }
}

/// Default credentials file location.
#[must_use]
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pairchat")
        .join("credentials.toml")
}
