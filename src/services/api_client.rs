use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::models::{Chat, ChatMessage, ChatUpdate, MessageRole};

/// Production endpoint of the chat backend.
pub const DEFAULT_API_BASE: &str = "https://api.merdannotfound.ru/api";

/// Every call is bounded by this; a timeout surfaces like any other
/// network failure.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not authenticated (401)")]
    Unauthorized,
    #[error("Not found (404)")]
    NotFound,
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Client-side view of the remote chat service.
///
/// Implemented by [`HttpChatApi`] for the real backend and by
/// [`LocalChatService`](super::ai_service::LocalChatService) for the
/// in-process simulator.
pub trait ChatApi: Send + Sync {
    /// Attach (or drop) the bearer credential used by subsequent calls.
    fn set_credential(&self, token: Option<&str>);

    fn list_chats(&self) -> impl Future<Output = Result<Vec<Chat>, ApiError>> + Send;

    fn get_chat(&self, id: &str) -> impl Future<Output = Result<Chat, ApiError>> + Send;

    fn create_chat(
        &self,
        title: &str,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<Chat, ApiError>> + Send;

    fn update_chat(
        &self,
        id: &str,
        update: ChatUpdate,
    ) -> impl Future<Output = Result<Chat, ApiError>> + Send;

    fn delete_chat(&self, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn send_message(
        &self,
        id: &str,
        content: &str,
    ) -> impl Future<Output = Result<Chat, ApiError>> + Send;
}

#[derive(Debug, Serialize)]
struct NewChatBody<'a> {
    title: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    role: MessageRole,
    content: &'a str,
}

/// REST client for the remote chat service.
pub struct HttpChatApi {
    client: Client,
    base_url: String,
    token: Mutex<Option<String>>,
}

impl HttpChatApi {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, url);

        let token = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        request
    }
}

impl Default for HttpChatApi {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

/// Map a response onto the error taxonomy, consuming the body of failed
/// requests for the error message.
pub(crate) async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound),
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(ApiError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

impl ChatApi for HttpChatApi {
    fn set_credential(&self, token: Option<&str>) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = token.map(str::to_string);
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, ApiError> {
        let response = self.request(Method::GET, "/chat").send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn get_chat(&self, id: &str) -> Result<Chat, ApiError> {
        let response = self
            .request(Method::GET, &format!("/chat/{}", id))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn create_chat(&self, title: &str, messages: &[ChatMessage]) -> Result<Chat, ApiError> {
        let response = self
            .request(Method::POST, "/chat")
            .json(&NewChatBody { title, messages })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn update_chat(&self, id: &str, update: ChatUpdate) -> Result<Chat, ApiError> {
        let response = self
            .request(Method::PUT, &format!("/chat/{}", id))
            .json(&update)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn delete_chat(&self, id: &str) -> Result<(), ApiError> {
        let response = self
            .request(Method::DELETE, &format!("/chat/{}", id))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn send_message(&self, id: &str, content: &str) -> Result<Chat, ApiError> {
        let response = self
            .request(Method::POST, &format!("/chat/{}/message", id))
            .json(&OutgoingMessage {
                role: MessageRole::User,
                content,
            })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}
