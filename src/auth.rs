//! Authentication and credential storage
//!
//! The streaming pipeline treats credentials as read-only input: every API
//! call needs a bearer token, and a missing token aborts before any request
//! is made. This module owns where that token comes from.
//!
//! Credentials live as one JSON blob in the system keyring. The
//! `KINTSUGI_API_TOKEN` environment variable overrides the keyring when
//! set, which makes it easy to point the binary at a test server or run in
//! environments without a keyring daemon.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::check_status;
use crate::error::{KintsugiError, Result};

/// Keyring service name
const KEYRING_SERVICE: &str = "kintsugi";
/// Keyring entry user
const KEYRING_USER: &str = "api_token";
/// Environment override for the access token
pub const TOKEN_ENV_VAR: &str = "KINTSUGI_API_TOKEN";

/// Credentials persisted between sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// Bearer access token attached to every API call
    pub access_token: String,
    /// Refresh token, needed for server-side logout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Successful login response from the auth endpoint
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    /// Bearer access token
    pub access_token: String,
    /// Refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Current-user profile from the `me` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    /// Account id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub username: Option<String>,
    /// Account email
    pub email: String,
}

/// Request body for the login endpoint
#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Request body for the logout endpoint
#[derive(Debug, Serialize)]
struct LogoutRequest<'a> {
    refresh_token: &'a str,
}

/// Keyring-backed credential store
///
/// # Examples
///
/// ```no_run
/// use kintsugi::auth::{StoredCredentials, TokenStore};
///
/// # fn main() -> kintsugi::Result<()> {
/// let store = TokenStore::new();
/// store.save(&StoredCredentials {
///     access_token: "token".to_string(),
///     refresh_token: None,
/// })?;
/// let token = store.access_token()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TokenStore {
    service: String,
    user: String,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    /// Creates the store using the standard keyring entry
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            user: KEYRING_USER.to_string(),
        }
    }

    /// Creates a store bound to a custom keyring entry
    ///
    /// Primarily useful for tests that must not touch the real entry.
    pub fn with_entry(service: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            user: user.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(&self.service, &self.user)?)
    }

    /// Persists credentials to the keyring
    pub fn save(&self, credentials: &StoredCredentials) -> Result<()> {
        let blob = serde_json::to_string(credentials)?;
        self.entry()?.set_password(&blob)?;
        Ok(())
    }

    /// Loads stored credentials, if any
    ///
    /// When `KINTSUGI_API_TOKEN` is set it wins over the keyring and is
    /// returned as credentials without a refresh token.
    pub fn load(&self) -> Result<Option<StoredCredentials>> {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.is_empty() {
                tracing::debug!("using access token from {}", TOKEN_ENV_VAR);
                return Ok(Some(StoredCredentials {
                    access_token: token,
                    refresh_token: None,
                }));
            }
        }

        match self.entry()?.get_password() {
            Ok(blob) => Ok(Some(serde_json::from_str(&blob)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the access token, or a missing-credentials error
    ///
    /// # Errors
    ///
    /// Returns [`KintsugiError::MissingCredentials`] when no token is
    /// stored; callers surface this as a prompt to run `kintsugi login`.
    pub fn access_token(&self) -> Result<String> {
        match self.load()? {
            Some(credentials) => Ok(credentials.access_token),
            None => Err(KintsugiError::MissingCredentials(
                "no stored token; run `kintsugi login` first".to_string(),
            )
            .into()),
        }
    }

    /// Removes stored credentials
    ///
    /// Clearing an already-empty store is not an error.
    pub fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Authenticates against the server with email/password
///
/// # Arguments
///
/// * `base_url` - Server base URL
/// * `email` - Account email
/// * `password` - Account password
/// * `timeout` - Request timeout
///
/// # Errors
///
/// Returns [`KintsugiError::Authentication`] on rejected credentials
/// (HTTP 401), [`KintsugiError::Api`] for other failures.
pub async fn login(
    base_url: &Url,
    email: &str,
    password: &str,
    timeout: Duration,
) -> Result<AuthResponse> {
    let url = base_url
        .join("/api/auth/login")
        .map_err(|e| KintsugiError::Config(format!("invalid login endpoint: {}", e)))?;

    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client
        .post(url)
        .json(&LoginRequest { email, password })
        .send()
        .await?;
    let response = check_status(response).await?;
    Ok(response.json().await?)
}

/// Fetches the authenticated user's profile
///
/// Doubles as a token check: a stale token surfaces here as an
/// authentication error before any chat traffic is attempted.
pub async fn me(base_url: &Url, access_token: &str, timeout: Duration) -> Result<UserProfile> {
    let url = base_url
        .join("/api/auth/me")
        .map_err(|e| KintsugiError::Config(format!("invalid me endpoint: {}", e)))?;

    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(url).bearer_auth(access_token).send().await?;
    let response = check_status(response).await?;
    Ok(response.json().await?)
}

/// Revokes the refresh token server-side
///
/// Best-effort companion to clearing the local store; callers typically
/// log a warning on failure rather than aborting logout.
pub async fn logout(
    base_url: &Url,
    access_token: &str,
    refresh_token: &str,
    timeout: Duration,
) -> Result<()> {
    let url = base_url
        .join("/api/auth/logout")
        .map_err(|e| KintsugiError::Config(format!("invalid logout endpoint: {}", e)))?;

    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client
        .post(url)
        .bearer_auth(access_token)
        .json(&LogoutRequest { refresh_token })
        .send()
        .await?;
    check_status(response).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_stored_credentials_roundtrip() {
        let credentials = StoredCredentials {
            access_token: "abc".to_string(),
            refresh_token: Some("def".to_string()),
        };
        let blob = serde_json::to_string(&credentials).unwrap();
        let back: StoredCredentials = serde_json::from_str(&blob).unwrap();
        assert_eq!(back.access_token, "abc");
        assert_eq!(back.refresh_token.as_deref(), Some("def"));
    }

    #[test]
    fn test_stored_credentials_omits_missing_refresh_token() {
        let credentials = StoredCredentials {
            access_token: "abc".to_string(),
            refresh_token: None,
        };
        let blob = serde_json::to_string(&credentials).unwrap();
        assert_eq!(blob, r#"{"access_token":"abc"}"#);
    }

    #[test]
    fn test_auth_response_deserialization() {
        let json = r#"{"access_token":"tok","refresh_token":"ref","user":{"id":"u1"}}"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "tok");
        assert_eq!(response.refresh_token.as_deref(), Some("ref"));
    }

    #[test]
    fn test_auth_response_without_refresh_token() {
        let json = r#"{"access_token":"tok"}"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();
        assert!(response.refresh_token.is_none());
    }

    #[test]
    fn test_user_profile_deserialization() {
        let json = r#"{"id":"u1","username":"kin","email":"kin@example.com","created_at":"2024-01-01T00:00:00Z"}"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.id, "u1");
        assert_eq!(profile.username.as_deref(), Some("kin"));
        assert_eq!(profile.email, "kin@example.com");
    }

    #[test]
    fn test_login_request_shape() {
        let body = serde_json::to_string(&LoginRequest {
            email: "a@b.c",
            password: "hunter22",
        })
        .unwrap();
        assert!(body.contains(r#""email":"a@b.c""#));
        assert!(body.contains(r#""password":"hunter22""#));
    }

    #[test]
    #[serial]
    fn test_env_override_wins() {
        std::env::set_var(TOKEN_ENV_VAR, "env-token");
        let store = TokenStore::with_entry("kintsugi-test", "nonexistent");
        let credentials = store.load().unwrap().unwrap();
        assert_eq!(credentials.access_token, "env-token");
        assert!(credentials.refresh_token.is_none());
        std::env::remove_var(TOKEN_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_empty_env_override_ignored() {
        std::env::set_var(TOKEN_ENV_VAR, "");
        let store = TokenStore::with_entry("kintsugi-test", "nonexistent");
        // Falls through to the keyring; either no entry or no keyring
        // backend, but never the empty env token.
        match store.load() {
            Ok(Some(credentials)) => assert!(!credentials.access_token.is_empty()),
            Ok(None) | Err(_) => {}
        }
        std::env::remove_var(TOKEN_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_access_token_from_env() {
        std::env::set_var(TOKEN_ENV_VAR, "env-token-2");
        let store = TokenStore::with_entry("kintsugi-test", "nonexistent");
        assert_eq!(store.access_token().unwrap(), "env-token-2");
        std::env::remove_var(TOKEN_ENV_VAR);
    }
}
