//! # relaykey-oauth
//!
//! `OAuth2` authorization for command-line mail senders: the three-legged
//! authorization code flow with PKCE, a loopback redirect listener, per-account
//! token persistence and SASL encodings for SMTP.
//!
//! ## Features
//!
//! - **Authorization code flow**: PKCE (`S256`) challenge, `state` checking,
//!   offline access so a refresh token is issued
//! - **Redirect listener**: one-shot local HTTP endpoint on `127.0.0.1`
//! - **Token management**: owner-only token files, automatic refresh
//! - **SASL mechanisms**: XOAUTH2 and OAUTHBEARER (RFC 7628)
//!
//! ## Quick Start
//!
//! ### One-time setup
//!
//! ```ignore
//! use relaykey_oauth::{ClientConfig, ConfigLayout, Identity, InteractiveOptions, TokenStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let layout = ConfigLayout::from_env()?;
//!     let client = ClientConfig::load(&layout.config_path())?.into_client()?;
//!     let identity = Identity::parse("me@gmail.com")?;
//!
//!     let token = relaykey_oauth::run_interactive_auth(
//!         client,
//!         identity.as_str(),
//!         InteractiveOptions::default(),
//!         &mut std::io::stdout(),
//!     )
//!     .await?;
//!
//!     TokenStore::new(layout).save(&identity, &token)?;
//!     Ok(())
//! }
//! ```
//!
//! ### Sending
//!
//! ```ignore
//! use std::sync::Arc;
//! use relaykey_oauth::sasl::Xoauth2Authenticator;
//!
//! let source = TokenStore::new(layout).token_source(&identity, client)?;
//! let auth = Xoauth2Authenticator::new(identity.as_str(), Arc::new(source));
//!
//! // After STARTTLS:
//! let (mechanism, initial_response) = auth.start(true).await?;
//! // Send: AUTH {mechanism} {initial_response}
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod flow;
mod identity;
pub mod provider;
pub mod sasl;
pub mod store;
pub mod token;

pub use config::{ClientConfig, ConfigLayout};
pub use error::{Error, Result};
pub use flow::{
    AuthorizationCode, AuthorizationCodeFlow, InteractiveAuth, InteractiveOptions, OAuthClient,
    RedirectListener, Session, run_interactive_auth,
};
pub use identity::Identity;
pub use provider::Provider;
pub use store::TokenStore;
pub use token::{TokenRecord, TokenSource};
