//! Login and logout command handlers
//!
//! `login` authenticates with email/password and stores the returned
//! tokens in the keyring; `logout` revokes the refresh token server-side
//! (best-effort) and clears the local entry.

use colored::Colorize;
use rustyline::DefaultEditor;

use crate::auth::{self, StoredCredentials, TokenStore};
use crate::config::Config;
use crate::error::Result;

/// Log in and persist credentials
///
/// # Arguments
///
/// * `config` - Client configuration (server base URL, timeouts)
/// * `email` - Account email; prompted interactively when omitted
pub async fn run_login(config: &Config, email: Option<String>) -> Result<()> {
    let base_url = config.base_url()?;

    let mut rl = DefaultEditor::new()?;
    let email = match email {
        Some(email) => email,
        None => rl.readline("email: ")?.trim().to_string(),
    };
    let password = rl.readline("password: ")?.trim().to_string();

    let response = auth::login(&base_url, &email, &password, config.request_timeout()).await?;

    let store = TokenStore::new();
    store.save(&StoredCredentials {
        access_token: response.access_token.clone(),
        refresh_token: response.refresh_token,
    })?;

    // Confirm the token works and greet by profile name when available.
    let who = match auth::me(&base_url, &response.access_token, config.request_timeout()).await {
        Ok(profile) => profile.username.unwrap_or(profile.email),
        Err(e) => {
            tracing::debug!("profile fetch after login failed: {}", e);
            email
        }
    };

    println!("{}", format!("Logged in to {} as {}", base_url, who).green());
    Ok(())
}

/// Revoke the session and clear stored credentials
pub async fn run_logout(config: &Config) -> Result<()> {
    let store = TokenStore::new();

    if let Some(credentials) = store.load()? {
        if let Some(refresh_token) = &credentials.refresh_token {
            let base_url = config.base_url()?;
            if let Err(e) = auth::logout(
                &base_url,
                &credentials.access_token,
                refresh_token,
                config.request_timeout(),
            )
            .await
            {
                tracing::warn!("server-side logout failed: {}", e);
            }
        }
        store.clear()?;
        println!("{}", "Logged out.".green());
    } else {
        println!("{}", "No stored credentials.".yellow());
    }

    Ok(())
}
