use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use thiserror::Error;

use crate::common::{Conversation, Message, MessageId, OutgoingMessage};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded with status {status}")]
    Status { status: u16 },
    #[error("invalid API base URL `{0}`")]
    InvalidBaseUrl(String),
}

/// REST operations the chat view depends on.
pub trait MessageApi: Send + Sync + 'static {
    fn fetch_history(
        &self,
        conversation: &Conversation,
    ) -> impl Future<Output = Result<Vec<Message>, ApiError>> + Send;

    /// Returns the created record when the backend echoes it.
    fn send_message(
        &self,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<Option<Message>, ApiError>> + Send;

    fn delete_message(&self, id: &MessageId)
    -> impl Future<Output = Result<(), ApiError>> + Send;
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    message: Option<Message>,
}

/// `MessageApi` over the backend's JSON endpoints.
#[derive(Debug, Clone)]
pub struct HttpMessageApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpMessageApi {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.into();
        let base_url = match Url::parse(&base_url) {
            Ok(url) if !url.cannot_be_a_base() => url,
            _ => return Err(ApiError::InvalidBaseUrl(base_url)),
        };
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl MessageApi for HttpMessageApi {
    async fn fetch_history(&self, conversation: &Conversation) -> Result<Vec<Message>, ApiError> {
        let url = self.url(&["messages", conversation.remote.as_str()])?;
        let response = self.execute(self.client.get(url)).await?;
        let history: HistoryResponse = response.json().await?;
        log::debug!(
            "Fetched {} messages with {}",
            history.messages.len(),
            conversation.remote
        );
        Ok(history.messages)
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<Option<Message>, ApiError> {
        let request = self.client.post(self.url(&["messages", "send"])?).json(message);
        let response = self.execute(request).await?;
        let body = response.bytes().await?;
        let echoed = serde_json::from_slice::<SendResponse>(&body)
            .ok()
            .and_then(|response| response.message);
        Ok(echoed)
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), ApiError> {
        let url = self.url(&["messages", id.as_str()])?;
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }
}
