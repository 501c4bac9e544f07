//! REST/streaming client for the Kintsugi backend
//!
//! [`ChatApi`] wraps the chat endpoints with bearer authentication. The
//! plain REST calls (create/list/get/update/delete chat, token usage) use a
//! client with a total request timeout; the two streaming calls
//! ([`send_message`](ChatApi::send_message),
//! [`regenerate_message`](ChatApi::regenerate_message)) use a client
//! without one -- a healthy stream can legitimately outlive any fixed
//! request budget, and its liveness is bounded per-chunk by the exchange
//! pipeline instead.
//!
//! Status handling: 401 maps to [`KintsugiError::Authentication`]; any
//! other non-2xx maps to [`KintsugiError::Api`] carrying the backend's
//! `{"error": "..."}` body when present.

use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{KintsugiError, Result};
use crate::store::Conversation;

/// Token quota information for the authenticated user
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed in the current period
    pub tokens_used: i64,
    /// Token allowance (-1 for unlimited plans)
    pub tokens_limit: i64,
    /// Whether further requests will be accepted
    pub has_capacity: bool,
    /// True when the plan has no token cap
    #[serde(default)]
    pub is_unlimited: bool,
}

/// Request body for creating a chat
#[derive(Debug, Serialize)]
struct CreateChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    model: &'a str,
}

/// Request body for updating a chat
#[derive(Debug, Serialize)]
struct UpdateChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// Request body for sending a message
#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<&'a str>,
}

/// Error body shape the backend uses for failures
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Bearer-authenticated client for the chat API
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use url::Url;
/// use kintsugi::api::ChatApi;
///
/// # fn main() -> kintsugi::Result<()> {
/// let api = ChatApi::new(
///     Url::parse("http://localhost:8080")?,
///     "token".to_string(),
///     Duration::from_secs(30),
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChatApi {
    /// Client for plain REST calls, with a total request timeout.
    http: Client,
    /// Client for streaming responses, no total timeout.
    stream_http: Client,
    base_url: Url,
    token: String,
}

impl ChatApi {
    /// Constructs a client for `base_url` using the given bearer token
    ///
    /// # Arguments
    ///
    /// * `base_url` - Server base (e.g. `http://localhost:8080`)
    /// * `token` - Bearer access token from the token store
    /// * `request_timeout` - Total timeout for non-streaming requests; also
    ///   the connect timeout for streaming ones
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP clients cannot be built.
    pub fn new(base_url: Url, token: String, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(request_timeout).build()?;
        let stream_http = Client::builder().connect_timeout(request_timeout).build()?;
        Ok(Self {
            http,
            stream_http,
            base_url,
            token,
        })
    }

    /// The configured server base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Joins a path onto the base URL
    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| KintsugiError::Config(format!("invalid endpoint {}: {}", path, e)).into())
    }

    /// Lists the user's chats, most recent first
    pub async fn list_chats(&self) -> Result<Vec<Conversation>> {
        let url = self.endpoint("/api/chats")?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Creates a new chat with the given model
    ///
    /// The server assigns a default title when `title` is `None`.
    pub async fn create_chat(&self, title: Option<&str>, model: &str) -> Result<Conversation> {
        let url = self.endpoint("/api/chats")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&CreateChatRequest { title, model })
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Fetches one chat with its full message list
    pub async fn get_chat(&self, chat_id: &str) -> Result<Conversation> {
        let url = self.endpoint(&format!("/api/chats/{}", chat_id))?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Updates a chat's title and/or model
    pub async fn update_chat(
        &self,
        chat_id: &str,
        title: Option<&str>,
        model: Option<&str>,
    ) -> Result<Conversation> {
        let url = self.endpoint(&format!("/api/chats/{}", chat_id))?;
        let response = self
            .http
            .put(url)
            .bearer_auth(&self.token)
            .json(&UpdateChatRequest { title, model })
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Deletes a chat
    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("/api/chats/{}", chat_id))?;
        let response = self
            .http
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Fetches the user's token quota state
    pub async fn token_usage(&self) -> Result<TokenUsage> {
        let url = self.endpoint("/api/chats/tokens")?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Sends a user message and returns the response byte stream
    ///
    /// The returned stream carries `data: <json>\n\n` frames and is meant
    /// to be fed to [`run_exchange`](crate::stream::run_exchange).
    ///
    /// # Arguments
    ///
    /// * `chat_id` - Target conversation
    /// * `content` - The user's message text
    /// * `system_prompt` - Optional per-exchange system prompt
    pub async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        system_prompt: Option<&str>,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>>> {
        let url = self.endpoint(&format!("/api/chats/{}/messages", chat_id))?;
        let response = self
            .stream_http
            .post(url)
            .bearer_auth(&self.token)
            .json(&SendMessageRequest {
                content,
                system_prompt,
            })
            .send()
            .await?;
        let response = check_status(response).await?;
        log_stream_content_type(&response);
        Ok(response.bytes_stream())
    }

    /// Re-streams an assistant message through the model
    ///
    /// The stream's committed text replaces the message's content.
    pub async fn regenerate_message(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>>> {
        let url = self.endpoint(&format!(
            "/api/chats/{}/messages/{}/regenerate",
            chat_id, message_id
        ))?;
        let response = self
            .stream_http
            .post(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = check_status(response).await?;
        log_stream_content_type(&response);
        Ok(response.bytes_stream())
    }
}

/// Warns when a streaming endpoint answered with an unexpected content type
fn log_stream_content_type(response: &reqwest::Response) {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.contains("text/event-stream") {
        tracing::debug!("streaming response content-type is {:?}", content_type);
    }
}

/// Maps non-success statuses to the error taxonomy
///
/// 401 becomes `Authentication`; everything else non-2xx becomes `Api`
/// carrying the backend's error message when one is present.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        let message = read_error_message(response).await;
        return Err(KintsugiError::Authentication(message).into());
    }
    if !status.is_success() {
        let message = read_error_message(response).await;
        return Err(KintsugiError::Api(format!("HTTP {}: {}", status.as_u16(), message)).into());
    }
    Ok(response)
}

/// Extracts the backend's `{"error": "..."}` message, falling back to the
/// raw body or the status reason
async fn read_error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) => match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => parsed.error,
            Err(_) if !body.trim().is_empty() => body.trim().to_string(),
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        },
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}
