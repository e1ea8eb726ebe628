//! Interactive three-legged authorization.
//!
//! Drives one attempt from a fresh [`Session`](super::Session) to a
//! [`TokenRecord`]:
//!
//! ```text
//! Idle -> AwaitingUserAction -> AwaitingCode -> Exchanging -> Complete
//!                    \________________\_______________\-----> Failed
//! ```
//!
//! The attempt can be driven in one call with [`run_interactive_auth`], or in
//! two halves ([`InteractiveAuth::start`] then
//! [`PendingAuthorization::finish`]) when the caller wants to present the
//! authorization URL itself.

use std::fmt;
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use super::{AuthorizationCodeFlow, DEFAULT_LISTEN_ADDR, OAuthClient, Redirect, RedirectListener};
use crate::error::{Error, Result};
use crate::token::TokenRecord;

/// How long to wait for the browser redirect by default.
pub const DEFAULT_CODE_TIMEOUT: Duration = Duration::from_secs(300);

/// Progress of an authorization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing started yet.
    Idle,
    /// URL shown, user has to consent in the browser.
    AwaitingUserAction,
    /// Blocked on the redirect listener.
    AwaitingCode,
    /// Code received, talking to the token endpoint.
    Exchanging,
    /// Tokens obtained.
    Complete,
    /// Attempt aborted.
    Failed,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingUserAction => "awaiting-user-action",
            Self::AwaitingCode => "awaiting-code",
            Self::Exchanging => "exchanging",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Knobs for an interactive attempt.
#[derive(Debug, Clone)]
pub struct InteractiveOptions {
    /// Loopback address of the redirect listener.
    pub listen_addr: SocketAddr,
    /// Upper bound on waiting for the redirect.
    pub timeout: Duration,
    /// Scopes to request; provider defaults when `None`.
    pub scopes: Option<Vec<String>>,
    /// Try to open the authorization URL in the default browser.
    pub open_browser: bool,
}

impl Default for InteractiveOptions {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR,
            timeout: DEFAULT_CODE_TIMEOUT,
            scopes: None,
            open_browser: false,
        }
    }
}

/// Entry point of an interactive attempt.
#[derive(Debug)]
pub struct InteractiveAuth {
    client: OAuthClient,
    options: InteractiveOptions,
}

impl InteractiveAuth {
    /// Creates an attempt for the given client.
    #[must_use]
    pub const fn new(client: OAuthClient, options: InteractiveOptions) -> Self {
        Self { client, options }
    }

    /// Generates the session, starts the listener and builds the URL.
    ///
    /// The redirect URI sent to the provider is always the listener's own
    /// address, so the two cannot drift apart.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the URL cannot be built.
    pub async fn start(self) -> Result<PendingAuthorization> {
        let listener = RedirectListener::bind(self.options.listen_addr).await?;
        let client = self.client.with_redirect_uri(listener.redirect_uri());
        let flow = AuthorizationCodeFlow::new(client);
        let url = flow.authorization_url(self.options.scopes.as_deref())?;

        let mut pending = PendingAuthorization {
            flow,
            listener,
            url,
            timeout: self.options.timeout,
            state: AuthState::Idle,
        };
        pending.transition(AuthState::AwaitingUserAction);

        if self.options.open_browser {
            if let Err(e) = opener::open(pending.url.as_str()) {
                warn!("could not open a browser: {e}");
            }
        }

        Ok(pending)
    }

    /// Runs the whole attempt, writing the user prompt to `out`.
    ///
    /// # Errors
    ///
    /// Any failure is terminal for the attempt; see
    /// [`PendingAuthorization::finish`].
    pub async fn run<W: Write>(self, identity: &str, out: &mut W) -> Result<TokenRecord> {
        let pending = self.start().await?;
        pending.prompt(identity, out)?;
        pending.finish().await
    }
}

/// An attempt whose URL is ready and whose listener is waiting.
#[derive(Debug)]
pub struct PendingAuthorization {
    flow: AuthorizationCodeFlow,
    listener: RedirectListener,
    url: Url,
    timeout: Duration,
    state: AuthState,
}

impl PendingAuthorization {
    /// URL the user has to open.
    #[must_use]
    pub const fn authorization_url(&self) -> &Url {
        &self.url
    }

    /// Redirect URI the listener answers on.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        self.listener.redirect_uri()
    }

    /// Current state of the attempt.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Writes the numbered instructions for the user.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `out` fails.
    pub fn prompt<W: Write>(&self, identity: &str, out: &mut W) -> Result<()> {
        writeln!(out)?;
        writeln!(
            out,
            "1. Ensure that you are logged in as {identity} in your browser."
        )?;
        writeln!(out)?;
        writeln!(out, "2. Open the following link and authorize relaykey:")?;
        writeln!(out, "{}", self.url)?;
        writeln!(out)?;
        writeln!(out, "3. Waiting for authorization code:")?;
        out.flush()?;
        Ok(())
    }

    /// Waits for the redirect, checks its state and exchanges the code.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`](crate::Error::Timeout) if the user never returns
    /// - [`Error::ProviderDenied`](crate::Error::ProviderDenied) if consent was refused
    /// - [`Error::StateMismatch`](crate::Error::StateMismatch) if the redirect, code or
    ///   error, echoes a state that is not ours
    /// - [`Error::ExchangeFailed`](crate::Error::ExchangeFailed) if the token request fails
    pub async fn finish(mut self) -> Result<TokenRecord> {
        self.transition(AuthState::AwaitingCode);
        let code = match self.listener.wait_for_redirect(self.timeout).await {
            Ok(Redirect::Code(code)) => code,
            Ok(Redirect::Denied { detail, state }) => {
                // providers echo the state on errors; a foreign one is not our denial
                let err = match state {
                    Some(echoed) if !self.flow.session().state_matches(&echoed) => {
                        Error::StateMismatch
                    }
                    _ => Error::ProviderDenied(detail),
                };
                return Err(self.fail(err));
            }
            Err(e) => return Err(self.fail(e)),
        };

        self.transition(AuthState::Exchanging);
        match self.flow.exchange(&code).await {
            Ok(token) => {
                self.transition(AuthState::Complete);
                info!(
                    has_refresh_token = token.refresh_token.is_some(),
                    "authorization complete"
                );
                if token.refresh_token.is_none() {
                    warn!("provider did not issue a refresh token; later runs will need setup again");
                }
                Ok(token)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        self.transition(AuthState::Failed);
        warn!("authorization failed: {err}");
        err
    }

    fn transition(&mut self, next: AuthState) {
        debug!(from = %self.state, to = %next, "authorization state");
        self.state = next;
    }
}

/// Runs one interactive authorization attempt end to end.
///
/// # Errors
///
/// See [`PendingAuthorization::finish`].
pub async fn run_interactive_auth<W: Write>(
    client: OAuthClient,
    identity: &str,
    options: InteractiveOptions,
    out: &mut W,
) -> Result<TokenRecord> {
    InteractiveAuth::new(client, options).run(identity, out).await
}
