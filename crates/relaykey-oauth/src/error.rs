//! Error types for `OAuth2` operations.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for `OAuth2` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `OAuth2` error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Token file could not be read or written.
    #[error("token storage error at {}: {source}", path.display())]
    Storage {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// No token has been set up for the account yet.
    #[error("no token found at {}; run the setup flow first", .0.display())]
    TokenNotFound(PathBuf),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `OAuth2` error from server.
    #[error("OAuth2 error: {error} - {description}")]
    OAuth {
        /// Error code (e.g., `invalid_grant`).
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// No refresh token available.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// Invalid token response.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Waiting for the authorization redirect timed out.
    #[error("Authorization timed out after {0:?}")]
    Timeout(Duration),

    /// The provider redirected back with an `error` parameter.
    #[error("authorization denied by provider: {0}")]
    ProviderDenied(String),

    /// The `state` echoed by the redirect does not belong to this session.
    #[error("authorization state mismatch; the redirect did not come from this attempt, please retry")]
    StateMismatch,

    /// Exchanging the authorization code for tokens failed.
    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(#[source] Box<Error>),

    /// The local redirect listener failed.
    #[error("redirect listener error: {0}")]
    Listener(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Account identity is not a usable email address.
    #[error("invalid account identity {0:?}: expected an email address")]
    InvalidIdentity(String),

    /// The transport offered an unencrypted connection.
    #[error("refusing to send credentials over an unencrypted connection")]
    Unencrypted,

    /// The server sent a SASL challenge the mechanism does not expect.
    #[error("unexpected SASL challenge: {0}")]
    UnexpectedChallenge(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl Error {
    /// Creates an OAuth error from error code and description.
    #[must_use]
    pub fn oauth_error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuth {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Wraps an I/O error with the path it occurred on.
    #[must_use]
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}
