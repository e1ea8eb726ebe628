//! Provider client configuration and file layout.
//!
//! The client config is the JSON file downloaded from the provider console
//! when registering a desktop client:
//!
//! ```json
//! {
//!   "installed": {
//!     "client_id": "1234.apps.googleusercontent.com",
//!     "client_secret": "GOCSPX-...",
//!     "auth_uri": "https://accounts.google.com/o/oauth2/auth",
//!     "token_uri": "https://oauth2.googleapis.com/token",
//!     "redirect_uris": ["http://127.0.0.1:5000"]
//!   }
//! }
//! ```

mod layout;

pub use layout::{APP_DIR, ConfigLayout};

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::flow::OAuthClient;
use crate::provider::{GMAIL_SCOPE, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, Provider};

/// Registered client credentials.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Client ID.
    pub client_id: String,
    /// Client secret; desktop clients get one even though it is not secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Authorization endpoint override.
    #[serde(default)]
    pub auth_uri: Option<String>,
    /// Token endpoint override.
    #[serde(default)]
    pub token_uri: Option<String>,
    /// Redirect URIs registered for the client.
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientConfig>,
    web: Option<ClientConfig>,
}

impl ClientConfig {
    /// Parses a client secret file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the JSON is malformed or holds neither an
    /// `installed` nor a `web` client.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let file: ClientSecretFile = serde_json::from_slice(data)
            .map_err(|e| Error::Config(format!("malformed client config: {e}")))?;
        let config = file
            .installed
            .or(file.web)
            .ok_or_else(|| Error::Config("no \"installed\" or \"web\" client found".into()))?;
        if config.client_id.trim().is_empty() {
            return Err(Error::Config("client_id is empty".into()));
        }
        Ok(config)
    }

    /// Reads and parses the client config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file is missing, unreadable or invalid.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("reading client config from {}", path.display());
        let data = std::fs::read(path).map_err(|e| {
            Error::Config(format!(
                "failed to read client config {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&data)
    }

    /// Builds the provider with any endpoint overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint is not a valid URL or is not https.
    pub fn provider(&self) -> Result<Provider> {
        let provider = Provider::new(
            "Google",
            self.auth_uri.as_deref().unwrap_or(GOOGLE_AUTH_URL),
            self.token_uri.as_deref().unwrap_or(GOOGLE_TOKEN_URL),
        )?
        .with_default_scopes(vec![GMAIL_SCOPE.to_string()]);
        provider.validate()?;
        Ok(provider)
    }

    /// Builds the OAuth client for this configuration.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::provider`].
    pub fn into_client(self) -> Result<OAuthClient> {
        let provider = self.provider()?;
        let client = OAuthClient::new(self.client_id, provider);
        Ok(match self.client_secret.filter(|s| !s.is_empty()) {
            Some(secret) => client.with_client_secret(secret),
            None => client,
        })
    }
}
