use crate::error::AgentError;
use crate::providers::sse::SseDecoder;
use crate::traits::{ChatMessage, ChatRequest, Fragment, FragmentStream, Provider};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "http://localhost:11434/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Fragments buffered between the body decoder and the consumer.
const FRAGMENT_BUFFER: usize = 10;

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    stream_options: StreamOptions,
    #[serde(skip_serializing_if = "<[Value]>::is_empty")]
    tools: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_url: String,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_connect_timeout(api_key, Duration::from_secs(30))
    }

    /// No overall request timeout is set: a stream lives as long as the
    /// model keeps talking, and turns are bounded by cancellation instead.
    pub fn with_connect_timeout(api_key: impl Into<String>, connect_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(?connect_timeout, "HTTP client setup failed, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn build_request<'a>(&'a self, request: &ChatRequest<'a>) -> OpenAIRequest<'a> {
        OpenAIRequest {
            model: &self.model,
            messages: request.messages,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
            tools: request.tools,
            tool_choice: (!request.tools.is_empty()).then_some("auto"),
        }
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat_stream(
        &self,
        request: ChatRequest<'_>,
        cancel: CancellationToken,
    ) -> anyhow::Result<FragmentStream> {
        let body = self.build_request(&request);

        let mut http_request = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .json(&body);
        if !self.api_key.is_empty() {
            http_request = http_request.bearer_auth(&self.api_key);
        }

        debug!(
            url = %self.api_url,
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Opening completion stream"
        );

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled.into()),
            response = http_request.send() => response.map_err(AgentError::Http)?,
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AgentError::Transport { status }.into());
        }

        let (tx, rx) = mpsc::channel::<Fragment>(FRAGMENT_BUFFER);
        tokio::spawn(pump_body(response, tx, cancel));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Reads the SSE body and forwards decoded fragments until EOF, `[DONE]`,
/// a decode error, or cancellation. Dropping `tx` closes the stream.
async fn pump_body(
    response: reqwest::Response,
    tx: mpsc::Sender<Fragment>,
    cancel: CancellationToken,
) {
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut out = Vec::new();

    while !decoder.is_done() {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Stream cancelled");
                return;
            }
            chunk = body.next() => chunk,
        };

        let decoded = match chunk {
            Some(Ok(bytes)) => decoder.feed(&bytes, &mut out),
            Some(Err(e)) => {
                warn!("Stream read failed: {}", e);
                return;
            }
            None => decoder.finish(&mut out),
        };

        if !forward(&tx, &mut out, &cancel).await {
            return;
        }
        if let Err(e) = decoded {
            warn!("Closing stream on decode error: {:#}", e);
            return;
        }
    }

    debug!("Stream complete");
}

/// Sends everything in `out`. Returns false when the consumer is gone or
/// the turn was cancelled.
async fn forward(
    tx: &mpsc::Sender<Fragment>,
    out: &mut Vec<Fragment>,
    cancel: &CancellationToken,
) -> bool {
    for fragment in out.drain(..) {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            sent = tx.send(fragment) => {
                if sent.is_err() {
                    return false;
                }
            }
        }
    }
    true
}
