//! Authorization Code Flow implementation.

use super::{AuthorizationCode, OAuthClient, Session};
use crate::error::{Error, Result};
use crate::token::TokenRecord;
use tracing::warn;
use url::Url;

/// Authorization Code Flow for `OAuth2`, always with PKCE.
///
/// One value per authorization attempt: it owns the [`Session`] whose
/// verifier and state the exchange is checked against.
#[derive(Debug)]
pub struct AuthorizationCodeFlow {
    client: OAuthClient,
    session: Session,
}

impl AuthorizationCodeFlow {
    /// Creates a new flow with freshly generated session secrets.
    #[must_use]
    pub fn new(client: OAuthClient) -> Self {
        Self::with_session(client, Session::generate())
    }

    /// Creates a flow around an existing session.
    #[must_use]
    pub const fn with_session(client: OAuthClient, session: Session) -> Self {
        Self { client, session }
    }

    /// Returns the session secrets of this attempt.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn client(&self) -> &OAuthClient {
        &self.client
    }

    /// Builds the authorization URL for user consent.
    ///
    /// Besides the standard parameters this always asks for offline access
    /// and forces the consent screen; without `prompt=consent` the provider
    /// omits the refresh token when the user authorized the client before.
    ///
    /// # Arguments
    ///
    /// * `scopes` - Optional scopes to request (uses provider defaults if None)
    ///
    /// # Errors
    ///
    /// Returns an error if no scope is available.
    pub fn authorization_url(&self, scopes: Option<&[String]>) -> Result<Url> {
        let scope_str = scopes.map_or_else(
            || self.client.provider.default_scopes.join(" "),
            |s| s.join(" "),
        );
        if scope_str.is_empty() {
            return Err(Error::Config("no scopes to request".into()));
        }

        let mut url = self.client.provider.auth_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.client.client_id)
                .append_pair("response_type", "code");

            if let Some(redirect_uri) = &self.client.redirect_uri {
                pairs.append_pair("redirect_uri", redirect_uri);
            }

            pairs
                .append_pair("scope", &scope_str)
                .append_pair("state", self.session.state())
                .append_pair("code_challenge", self.session.challenge())
                .append_pair("code_challenge_method", self.session.challenge_method())
                .append_pair("access_type", "offline")
                .append_pair("prompt", "consent");
        }

        Ok(url)
    }

    /// Exchanges the redirected authorization code for tokens.
    ///
    /// The echoed state is checked first; on mismatch nothing is sent to the
    /// token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateMismatch`] if the redirect does not belong to
    /// this session and [`Error::ExchangeFailed`] if the token request fails.
    pub async fn exchange(&self, code: &AuthorizationCode) -> Result<TokenRecord> {
        if !self.session.state_matches(&code.state) {
            warn!("authorization redirect carried an unexpected state");
            return Err(Error::StateMismatch);
        }

        self.client
            .exchange_code(&code.code, None, self.session.verifier())
            .await
            .map_err(|e| Error::ExchangeFailed(Box::new(e)))
    }
}
