//! Access tokens that refresh themselves.

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::TokenRecord;
use crate::error::Result;
use crate::flow::OAuthClient;
use crate::identity::Identity;
use crate::store::TokenStore;

/// Hands out a currently valid access token, refreshing when needed.
///
/// Concurrent callers share one refresh: the record is locked for the
/// duration of the request.
#[derive(Debug)]
pub struct TokenSource {
    client: OAuthClient,
    current: Mutex<TokenRecord>,
    persist: Option<(TokenStore, Identity)>,
}

impl TokenSource {
    /// Wraps a token; nothing is written back on refresh.
    #[must_use]
    pub fn new(client: OAuthClient, token: TokenRecord) -> Self {
        Self {
            client,
            current: Mutex::new(token),
            persist: None,
        }
    }

    /// Writes refreshed tokens back when the provider rotates the refresh token.
    #[must_use]
    pub(crate) fn persist_to(mut self, store: TokenStore, identity: Identity) -> Self {
        self.persist = Some((store, identity));
        self
    }

    /// Returns a valid token, refreshing it first if it has expired.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NoRefreshToken`] if the token expired and cannot
    /// be refreshed, or the provider's error if the refresh is rejected.
    pub async fn token(&self) -> Result<TokenRecord> {
        let mut current = self.current.lock().await;
        if current.is_valid() {
            return Ok(current.clone());
        }

        debug!("access token expired, refreshing");
        let fresh = self.client.refresh_token(&current).await?;
        let rotated = fresh.refresh_token != current.refresh_token;
        *current = fresh;

        if rotated && let Some((store, identity)) = &self.persist {
            info!("refresh token rotated for {identity}");
            store.save(identity, &current)?;
        }

        Ok(current.clone())
    }

    /// Returns only the access token string.
    ///
    /// # Errors
    ///
    /// See [`TokenSource::token`].
    pub async fn bearer(&self) -> Result<String> {
        Ok(self.token().await?.access_token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ConfigLayout;
    use crate::error::Error;
    use crate::provider::Provider;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OAuthClient {
        let provider = Provider::new(
            "Test",
            format!("{}/auth", server.uri()),
            format!("{}/token", server.uri()),
        )
        .unwrap();
        OAuthClient::new("cid", provider)
    }

    fn expired() -> TokenRecord {
        TokenRecord::new("stale", "Bearer")
            .with_refresh_token("1//old")
            .with_expiry(Utc::now() - Duration::minutes(5))
    }

    #[tokio::test]
    async fn test_valid_token_is_returned_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let token = TokenRecord::new("good", "Bearer").with_expiry(Utc::now() + Duration::hours(1));
        let source = TokenSource::new(client(&server), token);
        assert_eq!(source.bearer().await.unwrap(), "good");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("refresh_token=1%2F%2Fold"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = TokenSource::new(client(&server), expired());
        assert_eq!(source.bearer().await.unwrap(), "fresh");
        // second call uses the cached token
        assert_eq!(source.bearer().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "access_token": "fresh",
                        "token_type": "Bearer",
                        "expires_in": 3600
                    }))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = Arc::new(TokenSource::new(client(&server), expired()));
        let callers: Vec<_> = (0..8)
            .map(|_| {
                let source = Arc::clone(&source);
                tokio::spawn(async move { source.bearer().await })
            })
            .collect();

        for caller in callers {
            assert_eq!(caller.await.unwrap().unwrap(), "fresh");
        }
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let server = MockServer::start().await;
        let token = TokenRecord::new("stale", "Bearer").with_expiry(Utc::now() - Duration::hours(1));
        let source = TokenSource::new(client(&server), token);
        assert!(matches!(source.token().await, Err(Error::NoRefreshToken)));
    }

    #[tokio::test]
    async fn test_rejected_refresh_surfaces_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let source = TokenSource::new(client(&server), expired());
        let err = source.token().await.unwrap_err();
        assert!(matches!(err, Error::OAuth { ref error, .. } if error == "invalid_grant"));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_saved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "1//new"
            })))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let store = TokenStore::new(ConfigLayout::xdg(tmp.path()));
        let identity = Identity::parse("me@example.com").unwrap();
        store.save(&identity, &expired()).unwrap();

        let source = store.token_source(&identity, client(&server)).unwrap();
        source.token().await.unwrap();

        let saved = store.load(&identity).unwrap();
        assert_eq!(saved.refresh_token.as_deref(), Some("1//new"));
        assert_eq!(saved.access_token, "fresh");
    }

    #[tokio::test]
    async fn test_unrotated_refresh_leaves_file_alone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let store = TokenStore::new(ConfigLayout::xdg(tmp.path()));
        let identity = Identity::parse("me@example.com").unwrap();
        store.save(&identity, &expired()).unwrap();

        let source = store.token_source(&identity, client(&server)).unwrap();
        assert_eq!(source.bearer().await.unwrap(), "fresh");
        assert_eq!(store.load(&identity).unwrap().access_token, "stale");
    }
}
