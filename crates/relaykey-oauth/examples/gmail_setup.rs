//! Example: authorize a Gmail account and build an SMTP XOAUTH2 response
//!
//! This example demonstrates how to:
//! 1. Start the authorization code flow with PKCE and a loopback listener
//! 2. Wait for the browser redirect and exchange the code
//! 3. Use the token with SMTP XOAUTH2 authentication
//!
//! ## Prerequisites
//!
//! 1. Create a "Desktop app" OAuth client in the Google Cloud console and add
//!    `http://127.0.0.1:5000` as a redirect URI.
//!
//! 2. Set environment variables:
//!    ```bash
//!    export OAUTH_CLIENT_ID="your-client-id-here"
//!    export OAUTH_CLIENT_SECRET="your-client-secret-here"
//!    export OAUTH_EMAIL="your-email@gmail.com"
//!    ```
//!
//! ## Running
//!
//! ```bash
//! cargo run --example gmail_setup
//! ```

use std::env;
use std::sync::Arc;

use relaykey_oauth::sasl::Xoauth2Authenticator;
use relaykey_oauth::{InteractiveAuth, InteractiveOptions, OAuthClient, Provider, TokenSource};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client_id = env::var("OAUTH_CLIENT_ID")?;
    let client_secret = env::var("OAUTH_CLIENT_SECRET")?;
    let email = env::var("OAUTH_EMAIL")?;

    println!("relaykey OAuth2 Example - Gmail");
    println!("===============================\n");

    println!("Step 1: Configuring Google OAuth2 provider...");
    let provider = Provider::google()?;
    println!("  Auth URL: {}", provider.auth_url);
    println!("  Scopes: {:?}\n", provider.default_scopes);
    let client = OAuthClient::new(client_id, provider).with_client_secret(client_secret);

    println!("Step 2: Starting redirect listener...");
    let options = InteractiveOptions {
        open_browser: true,
        ..InteractiveOptions::default()
    };
    let pending = InteractiveAuth::new(client.clone(), options).start().await?;
    println!("  Listening on {}\n", pending.redirect_uri());

    pending.prompt(&email, &mut std::io::stdout())?;
    let token = pending.finish().await?;
    println!("\nStep 3: Authorized.");
    println!("  Refresh token issued: {}\n", token.refresh_token.is_some());

    println!("Step 4: Building SMTP AUTH XOAUTH2 response...");
    let source = Arc::new(TokenSource::new(client, token));
    let (mechanism, response) = Xoauth2Authenticator::new(email, source).start(true).await?;
    println!("  AUTH {mechanism} {response}");

    Ok(())
}
