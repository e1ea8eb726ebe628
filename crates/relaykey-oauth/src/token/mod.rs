//! `OAuth2` token types and management.

mod source;

pub use source::TokenSource;

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Access tokens this close to expiry are treated as expired.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// Token material obtained from the provider.
///
/// This is the unit persisted per account. A refresh produces a new record
/// rather than editing this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Access token string.
    pub access_token: String,
    /// Token type (usually "Bearer").
    #[serde(default)]
    pub token_type: String,
    /// Refresh token for obtaining new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token stops being valid.
    #[serde(
        default,
        deserialize_with = "deserialize_expiry",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<DateTime<Utc>>,
    /// Scope granted by authorization server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenRecord {
    /// Creates a new token.
    #[must_use]
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            refresh_token: None,
            expiry: None,
            scope: None,
        }
    }

    /// Creates a token from token response.
    ///
    /// # Errors
    ///
    /// Returns an error if the response carries no access token.
    pub fn from_response(response: TokenResponse) -> Result<Self> {
        if response.access_token.is_empty() {
            return Err(Error::InvalidResponse(
                "server returned an empty access_token".into(),
            ));
        }

        let expiry = response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(i64::from(secs)));

        Ok(Self {
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token,
            expiry,
            scope: response.scope,
        })
    }

    /// Checks if the token is expired (with 60 second buffer).
    ///
    /// A token without expiry never expires.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expiry
            .is_some_and(|exp| Utc::now() + Duration::seconds(EXPIRY_LEEWAY_SECS) >= exp)
    }

    /// Returns true if the token is valid (not expired).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }

    /// Returns the authorization scheme, defaulting to `Bearer`.
    #[must_use]
    pub fn auth_scheme(&self) -> &str {
        if self.token_type.is_empty() {
            "Bearer"
        } else {
            &self.token_type
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the expiration time.
    #[must_use]
    pub const fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Returns the refresh token if available.
    ///
    /// # Errors
    ///
    /// Returns an error if no refresh token is available.
    pub fn refresh_token(&self) -> Result<&str> {
        self.refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(Error::NoRefreshToken)
    }
}

/// Go's `oauth2` package writes `0001-01-01T00:00:00Z` for tokens that never
/// expire; read that as no expiry.
fn deserialize_expiry<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let expiry = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(expiry.filter(|t| t.year() > 1))
}

/// Token response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type.
    #[serde(default)]
    pub token_type: String,
    /// Expires in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u32>,
    /// Refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Error response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Error description.
    #[serde(default)]
    pub error_description: String,
}

impl ErrorResponse {
    /// Converts to an Error.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::oauth_error(self.error, self.error_description)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;

    #[test]
    fn test_token_creation() {
        let token = TokenRecord::new("access123", "Bearer");
        assert_eq!(token.access_token, "access123");
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expiry.is_none());
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn test_token_with_refresh() {
        let token = TokenRecord::new("access123", "Bearer").with_refresh_token("refresh456");
        assert_eq!(token.refresh_token().unwrap(), "refresh456");
    }

    #[test]
    fn test_missing_refresh_token() {
        let token = TokenRecord::new("access123", "Bearer");
        assert!(matches!(token.refresh_token(), Err(Error::NoRefreshToken)));

        let blank = TokenRecord::new("access123", "Bearer").with_refresh_token("");
        assert!(matches!(blank.refresh_token(), Err(Error::NoRefreshToken)));
    }

    #[test]
    fn test_token_expiration() {
        let expired = TokenRecord::new("access123", "Bearer")
            .with_expiry(Utc::now() - Duration::seconds(120));
        assert!(expired.is_expired());
        assert!(!expired.is_valid());

        let nearly = TokenRecord::new("access123", "Bearer")
            .with_expiry(Utc::now() + Duration::seconds(30));
        assert!(nearly.is_expired());

        let valid = TokenRecord::new("access123", "Bearer")
            .with_expiry(Utc::now() + Duration::seconds(3600));
        assert!(!valid.is_expired());
        assert!(valid.is_valid());

        assert!(TokenRecord::new("access123", "Bearer").is_valid());
    }

    #[test]
    fn test_auth_scheme_defaults_to_bearer() {
        assert_eq!(TokenRecord::new("a", "").auth_scheme(), "Bearer");
        assert_eq!(TokenRecord::new("a", "MAC").auth_scheme(), "MAC");
    }

    #[test]
    fn test_token_from_response() {
        let response = TokenResponse {
            access_token: "test_token".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            refresh_token: Some("refresh".to_string()),
            scope: Some("https://mail.google.com/".to_string()),
        };

        let token = TokenRecord::from_response(response).unwrap();
        assert_eq!(token.access_token, "test_token");
        assert!(token.expiry.is_some());
        assert!(token.is_valid());
    }

    #[test]
    fn test_token_from_empty_response() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"","token_type":"Bearer"}"#).unwrap();
        assert!(matches!(
            TokenRecord::from_response(response),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_reads_go_oauth2_token_file() {
        let json = r#"{
            "access_token": "ya29.a0",
            "token_type": "Bearer",
            "refresh_token": "1//0g",
            "expiry": "2024-03-01T12:30:45.123456789+01:00"
        }"#;
        let token: TokenRecord = serde_json::from_str(json).unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("1//0g"));
        assert_eq!(token.expiry.unwrap().timestamp(), 1709292645);
    }

    #[test]
    fn test_zero_expiry_means_never() {
        let json = r#"{"access_token":"a","token_type":"Bearer","expiry":"0001-01-01T00:00:00Z"}"#;
        let token: TokenRecord = serde_json::from_str(json).unwrap();
        assert!(token.expiry.is_none());
        assert!(token.is_valid());
    }

    #[test]
    fn test_error_response_into_error() {
        let response: ErrorResponse =
            serde_json::from_str(r#"{"error":"invalid_grant"}"#).unwrap();
        match response.into_error() {
            Error::OAuth { error, description } => {
                assert_eq!(error, "invalid_grant");
                assert!(description.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
