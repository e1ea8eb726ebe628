//! `relaykey` - `OAuth2` credentials for command-line mail senders.
//!
//! `relaykey --sender me@gmail.com --setup` authorizes the account once;
//! afterwards `relaykey --sender me@gmail.com` prints a credential that an
//! SMTP client can send after `AUTH`.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relaykey_oauth::sasl::Xoauth2Authenticator;
use relaykey_oauth::{
    ClientConfig, ConfigLayout, Identity, InteractiveOptions, OAuthClient, TokenStore,
};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if cli.from.is_some() || cli.ignore_dots {
        debug!(from = ?cli.from, ignore_dots = cli.ignore_dots, "ignoring sendmail flags");
    }

    let identity = Identity::parse(cli.sender.as_str()).context("invalid --sender")?;
    let layout = ConfigLayout::from_env().context("failed to locate the config directory")?;
    debug!(dir = %layout.dir().display(), "using config layout");

    let config_path = layout.config_path();
    let client = ClientConfig::load(&config_path)
        .and_then(ClientConfig::into_client)
        .with_context(|| format!("failed to load client config {}", config_path.display()))?;
    let store = TokenStore::new(layout);

    if cli.setup {
        setup(&cli, &identity, client, &store).await
    } else {
        print_credential(&cli, &identity, client, &store).await
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "relaykey=debug,relaykey_oauth=debug"
    } else {
        "relaykey=info,relaykey_oauth=info"
    };

    // stdout carries the credential
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn setup(
    cli: &Cli,
    identity: &Identity,
    client: OAuthClient,
    store: &TokenStore,
) -> Result<()> {
    info!("starting authorization for {identity}");
    let options = InteractiveOptions {
        listen_addr: cli.listen,
        timeout: Duration::from_secs(cli.timeout),
        scopes: None,
        open_browser: !cli.no_browser,
    };

    let mut stdout = io::stdout();
    let token =
        relaykey_oauth::run_interactive_auth(client, identity.as_str(), options, &mut stdout)
            .await
            .context("authorization failed")?;

    store
        .save(identity, &token)
        .context("failed to save the token")?;

    writeln!(stdout)?;
    writeln!(
        stdout,
        "Token saved to {}. Run without --setup to send mail as {identity}.",
        store.path(identity).display()
    )?;
    Ok(())
}

async fn print_credential(
    cli: &Cli,
    identity: &Identity,
    client: OAuthClient,
    store: &TokenStore,
) -> Result<()> {
    let source = store
        .token_source(identity, client)
        .with_context(|| format!("no usable token for {identity}; run with --setup first"))?;

    let credential = match cli.format.mechanism() {
        None => source.bearer().await.context("failed to obtain an access token")?,
        Some(mechanism) => {
            let auth = Xoauth2Authenticator::new(identity.as_str(), Arc::new(source))
                .with_mechanism(mechanism);
            // the credential is handed to a TLS transport
            let (name, response) = auth
                .start(true)
                .await
                .context("failed to obtain an access token")?;
            debug!(mechanism = name, "built SASL initial response");
            response
        }
    };

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{credential}")?;
    Ok(())
}
