//! Command-line interface definition.

use std::net::SocketAddr;

use clap::{Parser, ValueEnum};
use relaykey_oauth::flow::{DEFAULT_CODE_TIMEOUT, DEFAULT_LISTEN_ADDR};
use relaykey_oauth::sasl::Mechanism;

/// Obtain and refresh `OAuth2` credentials for sending mail.
///
/// Run once with `--setup` to authorize the account in a browser. Later runs
/// print a fresh credential for the SMTP transport.
#[derive(Parser, Debug, Clone)]
#[command(name = "relaykey")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Account to authorize or send as
    #[arg(long, env = "RELAYKEY_SENDER")]
    pub sender: String,

    /// Run the interactive authorization and save the token
    #[arg(long)]
    pub setup: bool,

    /// Credential to print when not in setup mode
    #[arg(long, value_enum, default_value_t = Format::Xoauth2)]
    pub format: Format,

    /// Seconds to wait for the browser redirect
    #[arg(long, default_value_t = DEFAULT_CODE_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Do not try to open the authorization link in a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Loopback address of the redirect listener
    #[arg(long, default_value_t = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Ignored; accepted for sendmail compatibility
    #[arg(short = 'f', hide = true)]
    pub from: Option<String>,

    /// Ignored; accepted for sendmail compatibility
    #[arg(short = 'i', hide = true)]
    pub ignore_dots: bool,
}

/// Output format of the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// The raw access token
    Bearer,
    /// Base64 `XOAUTH2` initial response
    Xoauth2,
    /// Base64 `OAUTHBEARER` initial response
    Oauthbearer,
}

impl Format {
    /// SASL mechanism for the format, if it is one.
    pub const fn mechanism(self) -> Option<Mechanism> {
        match self {
            Self::Bearer => None,
            Self::Xoauth2 => Some(Mechanism::XOAuth2),
            Self::Oauthbearer => Some(Mechanism::OAuthBearer),
        }
    }
}
