//! SASL mechanisms for presenting the access token to a mail server.
//!
//! Implements:
//! - OAUTHBEARER (RFC 7628) - Standard `OAuth2` authentication
//! - XOAUTH2 (Google/Microsoft proprietary) - Legacy `OAuth2` authentication

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::error::{Error, Result};
use crate::token::TokenSource;

/// Generates OAUTHBEARER initial response (RFC 7628).
///
/// Format: `n,a=<user>,\x01auth=Bearer <token>\x01\x01`
///
/// # Example
///
/// ```
/// use relaykey_oauth::sasl::oauthbearer_response;
///
/// let response = oauthbearer_response("user@example.com", "ya29.a0...");
/// // Can be used with SMTP AUTH OAUTHBEARER
/// ```
#[must_use]
pub fn oauthbearer_response(user: &str, token: &str) -> String {
    let auth_string = format!("n,a={user},\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates XOAUTH2 initial response.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
///
/// # Example
///
/// ```
/// use relaykey_oauth::sasl::xoauth2_response;
///
/// let response = xoauth2_response("user@example.com", "ya29.a0...");
/// // Can be used with SMTP AUTH XOAUTH2
/// ```
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    xoauth2_response_with_scheme(user, "Bearer", token)
}

fn xoauth2_response_with_scheme(user: &str, scheme: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth={scheme} {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Parses an `OAuth2` error challenge from the server.
///
/// `OAuth2` errors are JSON-encoded: `{"status":"401", "schemes":"bearer", "scope":"..."}`
///
/// # Errors
///
/// Returns an error if the response cannot be parsed.
pub fn parse_oauth_error(response: &str) -> std::result::Result<OAuthError, serde_json::Error> {
    serde_json::from_str(response)
}

/// `OAuth2` error challenge from server.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuthError {
    /// HTTP status code.
    pub status: String,
    /// Authentication schemes supported.
    #[serde(default)]
    pub schemes: String,
    /// `OAuth2` scope required.
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.status)?;
        if let Some(scope) = &self.scope {
            write!(f, ", scope {scope}")?;
        }
        Ok(())
    }
}

/// SASL mechanism name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mechanism {
    /// `XOAUTH2`.
    #[default]
    XOAuth2,
    /// `OAUTHBEARER`.
    OAuthBearer,
}

impl Mechanism {
    /// Name as sent in `AUTH`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::XOAuth2 => "XOAUTH2",
            Self::OAuthBearer => "OAUTHBEARER",
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mechanism {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "XOAUTH2" => Ok(Self::XOAuth2),
            "OAUTHBEARER" => Ok(Self::OAuthBearer),
            _ => Err(Error::Config(format!("unsupported SASL mechanism: {s}"))),
        }
    }
}

/// Client side of an `OAuth2` SASL exchange for an SMTP transport.
///
/// The initial response carries everything; any server challenge means the
/// token was rejected.
#[derive(Debug, Clone)]
pub struct Xoauth2Authenticator {
    user: String,
    source: Arc<TokenSource>,
    mechanism: Mechanism,
}

impl Xoauth2Authenticator {
    /// Authenticator for `user` using the `XOAUTH2` mechanism.
    #[must_use]
    pub fn new(user: impl Into<String>, source: Arc<TokenSource>) -> Self {
        Self {
            user: user.into(),
            source,
            mechanism: Mechanism::XOAuth2,
        }
    }

    /// Switches the mechanism.
    #[must_use]
    pub const fn with_mechanism(mut self, mechanism: Mechanism) -> Self {
        self.mechanism = mechanism;
        self
    }

    /// The mechanism in use.
    #[must_use]
    pub const fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    /// Starts the exchange, returning the mechanism name and the base64
    /// initial response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unencrypted`] unless the connection is TLS protected,
    /// or the token source's error if no valid token can be obtained.
    pub async fn start(&self, tls: bool) -> Result<(&'static str, String)> {
        if !tls {
            return Err(Error::Unencrypted);
        }

        let token = self.source.token().await?;
        debug!(mechanism = %self.mechanism, user = %self.user, "starting SASL exchange");
        let response = match self.mechanism {
            Mechanism::XOAuth2 => {
                xoauth2_response_with_scheme(&self.user, token.auth_scheme(), &token.access_token)
            }
            Mechanism::OAuthBearer => oauthbearer_response(&self.user, &token.access_token),
        };
        Ok((self.mechanism.as_str(), response))
    }

    /// Handles a server challenge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedChallenge`] when the server asks for more,
    /// carrying the decoded error if there is one.
    pub fn next(&self, challenge: &[u8], more: bool) -> Result<()> {
        if !more {
            return Ok(());
        }

        let text = STANDARD
            .decode(challenge)
            .map_or_else(
                |_| String::from_utf8_lossy(challenge).into_owned(),
                |raw| String::from_utf8_lossy(&raw).into_owned(),
            );
        let detail = parse_oauth_error(&text).map_or(text, |e| e.to_string());
        Err(Error::UnexpectedChallenge(detail))
    }
}
