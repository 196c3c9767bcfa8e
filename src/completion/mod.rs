pub mod sse;

use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sse::{SseDecoder, SseEvent};

pub const DEFAULT_BASE_URL: &str = "https://llmfoundry.straive.com/openai/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("invalid completion endpoint '{url}': {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("invalid authorization header value")]
    InvalidHeader,

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("{}", describe_transport(.source))]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    #[error("{}", describe_status(.status, .body))]
    Status { status: u16, body: String },

    #[error("malformed stream event '{data}': {message}")]
    MalformedEvent { data: String, message: String },
}

impl From<reqwest::Error> for CompletionError {
    fn from(source: reqwest::Error) -> Self {
        CompletionError::Transport { source }
    }
}

fn describe_transport(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timeout - the completion API took too long to respond".to_string()
    } else if e.is_connect() {
        "connection error - unable to reach the completion API".to_string()
    } else {
        format!("network error: {e}")
    }
}

fn describe_status(status: &u16, body: &str) -> String {
    match *status {
        401 => "authentication failed - check your token".to_string(),
        403 => "access forbidden - insufficient permissions".to_string(),
        429 => "rate limit exceeded - too many requests".to_string(),
        500..=599 => format!("server error ({status}): {body}"),
        _ => format!("HTTP error {status}: {body}"),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct StreamOptions {
    pub include_usage: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: String,
    pub stream: bool,
    pub stream_options: StreamOptions,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// A streaming request with system instructions and the data payload as
    /// the user message.
    pub fn report(model: &str, instructions: &str, payload: &str) -> Self {
        Self {
            model: model.to_string(),
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
            messages: vec![ChatMessage::system(instructions), ChatMessage::user(payload)],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One streamed completion chunk.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatChunk {
    pub fn parse(data: &str) -> Result<Self, CompletionError> {
        serde_json::from_str(data).map_err(|e| CompletionError::MalformedEvent {
            data: data.to_string(),
            message: e.to_string(),
        })
    }

    /// The text fragment at `choices[0].delta.content`. Empty strings count as
    /// absent.
    pub fn fragment(&self) -> Option<&str> {
        self.choices
            .first()?
            .delta
            .as_ref()?
            .content
            .as_deref()
            .filter(|s| !s.is_empty())
    }
}

#[derive(Clone, Debug)]
pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    authorization: String,
}

impl CompletionClient {
    /// `base_url` is the API root; requests go to `{base_url}/chat/completions`.
    /// `app_tag` is appended to the token as `token:tag` when present.
    pub fn new(
        base_url: &str,
        token: &str,
        app_tag: Option<&str>,
        connect_timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let endpoint = completions_endpoint(base_url)?;
        let authorization = match app_tag.map(str::trim).filter(|t| !t.is_empty()) {
            Some(tag) => format!("Bearer {token}:{tag}"),
            None => format!("Bearer {token}"),
        };
        reqwest::header::HeaderValue::from_str(&authorization)
            .map_err(|_| CompletionError::InvalidHeader)?;
        // no overall timeout: a report may stream for minutes
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|source| CompletionError::HttpClientBuild { source })?;
        Ok(Self {
            http,
            endpoint,
            authorization,
        })
    }

    /// Sends the request and returns the decoded event stream once the server
    /// has accepted it.
    pub async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<impl Stream<Item = Result<SseEvent, CompletionError>>, CompletionError> {
        tracing::debug!(endpoint = %self.endpoint, model = %request.model, "opening completion stream");
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(sse::decode_stream(Box::pin(response.bytes_stream())))
    }
}

pub fn completions_endpoint(base_url: &str) -> Result<reqwest::Url, CompletionError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let url = format!("{trimmed}/chat/completions");
    reqwest::Url::parse(&url).map_err(|e| CompletionError::InvalidEndpoint {
        url: base_url.to_string(),
        message: e.to_string(),
    })
}
