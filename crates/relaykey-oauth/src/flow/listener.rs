//! Loopback HTTP endpoint that receives the authorization redirect.
//!
//! The browser is sent back to `http://127.0.0.1:<port>/?code=...&state=...`
//! after the user consents. The listener hands exactly one outcome (a code or
//! a provider error) to the waiting flow through a one-shot channel and
//! answers every later redirect with `410 Gone`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Address registered as the redirect URI for the desktop client.
pub const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000);

/// How long shutdown waits for in-flight responses before aborting.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Authorization code delivered by the provider redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    /// Single-use code to exchange for tokens.
    pub code: String,
    /// State echoed back by the provider (empty when absent).
    pub state: String,
}

impl AuthorizationCode {
    /// Creates a code/state pair.
    #[must_use]
    pub fn new(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            state: state.into(),
        }
    }
}

/// What the provider redirected back with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Consent was given.
    Code(AuthorizationCode),
    /// The provider reported an `error`.
    Denied {
        /// `error`, followed by `error_description` when present.
        detail: String,
        /// State echoed with the error, if any.
        state: Option<String>,
    },
}

#[derive(Clone)]
struct CallbackState {
    sender: Arc<Mutex<Option<oneshot::Sender<Redirect>>>>,
}

impl CallbackState {
    /// Hands the outcome to the waiting flow. Returns false once the single
    /// delivery slot is used up or nobody is waiting anymore.
    async fn deliver(&self, delivery: Redirect) -> bool {
        let Some(sender) = self.sender.lock().await.take() else {
            return false;
        };
        sender.send(delivery).is_ok()
    }
}

/// Disposable redirect listener, one per authorization attempt.
///
/// Dropping it stops the server.
pub struct RedirectListener {
    local_addr: SocketAddr,
    code_rx: Option<oneshot::Receiver<Redirect>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RedirectListener {
    /// Binds the listener and starts serving in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (for example when a
    /// previous attempt still holds the port).
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Listener(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Listener(format!("failed to read bound address: {e}")))?;

        let (code_tx, code_rx) = oneshot::channel();
        let state = CallbackState {
            sender: Arc::new(Mutex::new(Some(code_tx))),
        };
        let app = Router::new()
            .route("/", get(handle_redirect))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("redirect listener error: {err}");
            }
        });

        info!("listening for authorization redirect on {local_addr}");

        Ok(Self {
            local_addr,
            code_rx: Some(code_rx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Redirect URI to register with the provider.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Waits for the redirect, then stops the server.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if nothing arrived within `timeout`
    /// - [`Error::Listener`] if the server stopped or the redirect was already taken
    pub async fn wait_for_redirect(&mut self, timeout: Duration) -> Result<Redirect> {
        let code_rx = self
            .code_rx
            .take()
            .ok_or_else(|| Error::Listener("authorization code already consumed".into()))?;

        let outcome = tokio::time::timeout(timeout, code_rx).await;
        self.shutdown().await;

        match outcome {
            Ok(Ok(redirect)) => {
                debug!("authorization redirect received");
                Ok(redirect)
            }
            Ok(Err(_)) => Err(Error::Listener(
                "listener stopped before an authorization code arrived".into(),
            )),
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    /// Like [`RedirectListener::wait_for_redirect`], treating a provider error
    /// as failure.
    ///
    /// # Errors
    ///
    /// [`Error::ProviderDenied`] if the redirect carried an `error`, otherwise
    /// see [`RedirectListener::wait_for_redirect`].
    pub async fn wait_for_code(&mut self, timeout: Duration) -> Result<AuthorizationCode> {
        match self.wait_for_redirect(timeout).await? {
            Redirect::Code(code) => Ok(code),
            Redirect::Denied { detail, .. } => Err(Error::ProviderDenied(detail)),
        }
    }

    /// Stops accepting redirects and waits briefly for in-flight responses.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                warn!("redirect listener did not stop in time; aborting");
                handle.abort();
            }
        }
    }
}

impl std::fmt::Debug for RedirectListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectListener")
            .field("local_addr", &self.local_addr)
            .field("waiting", &self.code_rx.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for RedirectListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

async fn handle_redirect(
    method: Method,
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    // axum routes HEAD to GET handlers; a prefetch must not use up the delivery
    if method != Method::GET {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            "expecting a GET request\n".to_string(),
        );
    }

    if let Some(error) = params.get("error") {
        let detail = params
            .get("error_description")
            .map_or_else(|| error.clone(), |desc| format!("{error}: {desc}"));
        warn!("provider returned an authorization error: {detail}");
        let denied = Redirect::Denied {
            detail: detail.clone(),
            state: params.get("state").cloned(),
        };
        if !state.deliver(denied).await {
            return already_done();
        }
        return (
            StatusCode::OK,
            format!("Authorization failed: {detail}\nYou can close this window.\n"),
        );
    }

    let Some(code) = params.get("code") else {
        return (
            StatusCode::BAD_REQUEST,
            "expecting query param: code\n".to_string(),
        );
    };

    let echoed_state = params.get("state").cloned().unwrap_or_default();
    let delivery = AuthorizationCode::new(code.clone(), echoed_state);
    if !state.deliver(Redirect::Code(delivery)).await {
        warn!("rejected a redirect after the authorization code was delivered");
        return already_done();
    }

    (
        StatusCode::OK,
        "Authorization received. You can close this window and return to the terminal.\n"
            .to_string(),
    )
}

fn already_done() -> (StatusCode, String) {
    (
        StatusCode::GONE,
        "This authorization attempt has already completed.\n".to_string(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn local_listener() -> RedirectListener {
        RedirectListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap()
    }

    async fn get(listener: &RedirectListener, query: &str) -> (u16, String) {
        let response = reqwest::get(format!("{}/{query}", listener.redirect_uri()))
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.text().await.unwrap())
    }

    #[tokio::test]
    async fn test_delivers_code_and_state() {
        let mut listener = local_listener().await;
        let (status, body) = get(&listener, "?code=AUTH1&state=xyz123").await;
        assert_eq!(status, 200);
        assert!(body.contains("Authorization received"));

        let code = listener
            .wait_for_code(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(code, AuthorizationCode::new("AUTH1", "xyz123"));
    }

    #[tokio::test]
    async fn test_missing_code_prompts_and_keeps_waiting() {
        let mut listener = local_listener().await;
        let (status, body) = get(&listener, "?state=xyz123").await;
        assert_eq!(status, 400);
        assert!(body.contains("expecting query param: code"));

        let (status, _) = get(&listener, "?code=LATER&state=xyz123").await;
        assert_eq!(status, 200);
        let code = listener
            .wait_for_code(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(code.code, "LATER");
    }

    #[tokio::test]
    async fn test_second_delivery_rejected() {
        let mut listener = local_listener().await;
        let (first, _) = get(&listener, "?code=AUTH1&state=xyz123").await;
        let (second, body) = get(&listener, "?code=AUTH2&state=xyz123").await;
        assert_eq!(first, 200);
        assert_eq!(second, 410);
        assert!(body.contains("already completed"));

        let code = listener
            .wait_for_code(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(code.code, "AUTH1");
    }

    #[tokio::test]
    async fn test_provider_error_unblocks_waiter() {
        let mut listener = local_listener().await;
        let (status, body) = get(&listener, "?error=access_denied").await;
        assert_eq!(status, 200);
        assert!(body.contains("access_denied"));

        let err = listener
            .wait_for_code(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderDenied(ref e) if e == "access_denied"));
    }

    #[tokio::test]
    async fn test_error_description_included() {
        let mut listener = local_listener().await;
        get(&listener, "?error=access_denied&error_description=user+said+no").await;

        let err = listener
            .wait_for_code(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderDenied(ref e) if e == "access_denied: user said no"));
    }

    #[tokio::test]
    async fn test_denied_redirect_keeps_state() {
        let mut listener = local_listener().await;
        get(&listener, "?error=access_denied&state=xyz123").await;

        let redirect = listener
            .wait_for_redirect(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(
            redirect,
            Redirect::Denied {
                detail: "access_denied".into(),
                state: Some("xyz123".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_head_request_does_not_consume_delivery() {
        let mut listener = local_listener().await;
        let url = format!("{}/?code=PREFETCH&state=s", listener.redirect_uri());
        let head = reqwest::Client::new().head(url).send().await.unwrap();
        assert_eq!(head.status().as_u16(), 405);

        let (status, _) = get(&listener, "?code=AUTH1&state=s").await;
        assert_eq!(status, 200);
        let code = listener
            .wait_for_code(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(code.code, "AUTH1");
    }

    #[tokio::test]
    async fn test_times_out_without_redirect() {
        let mut listener = local_listener().await;
        let err = listener
            .wait_for_code(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_wait_consumes_receiver() {
        let mut listener = local_listener().await;
        get(&listener, "?code=AUTH1&state=s").await;
        listener.wait_for_code(Duration::from_secs(5)).await.unwrap();

        let err = listener
            .wait_for_code(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Listener(_)));
    }

    #[tokio::test]
    async fn test_port_released_after_wait() {
        let mut listener = local_listener().await;
        let addr = listener.local_addr();
        get(&listener, "?code=AUTH1&state=s").await;
        listener.wait_for_code(Duration::from_secs(5)).await.unwrap();

        let rebound = RedirectListener::bind(addr).await;
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn test_bind_conflict_reported() {
        let listener = local_listener().await;
        let err = RedirectListener::bind(listener.local_addr())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Listener(ref msg) if msg.contains("failed to bind")));
    }
}
