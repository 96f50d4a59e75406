use crate::error::AgentError;
use crate::traits::{ChatMessage, ChatRequest, Fragment, FragmentStream, Provider};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// One scripted reply from [`MockProvider`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Stream(Vec<Fragment>),
    /// Sends the fragments, then never ends.
    Stall(Vec<Fragment>),
    Status(u16),
}

/// A provider that replays pre-configured streams, for testing. Every
/// request's transcript is recorded so callers can assert on what was sent.
#[derive(Debug, Default)]
pub struct MockProvider {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<(Vec<ChatMessage>, Vec<Value>)>>,
    repeat_last: bool,
}

impl MockProvider {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn streams(streams: Vec<Vec<Fragment>>) -> Self {
        Self::new(streams.into_iter().map(MockReply::Stream).collect())
    }

    /// Keep answering with the final reply once the script runs out.
    pub fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// The transcript sent with each call, in call order.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|(messages, _)| messages.clone()).collect())
            .unwrap_or_default()
    }

    /// The tool manifest sent with each call, in call order.
    pub fn tools_sent(&self) -> Vec<Vec<Value>> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|(_, tools)| tools.clone()).collect())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn next_reply(&self) -> Option<MockReply> {
        let mut replies = self.replies.lock().ok()?;
        if self.repeat_last && replies.len() == 1 {
            return replies.front().cloned();
        }
        replies.pop_front()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn chat_stream(
        &self,
        request: ChatRequest<'_>,
        cancel: CancellationToken,
    ) -> anyhow::Result<FragmentStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((request.messages.to_vec(), request.tools.to_vec()));
        }
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled.into());
        }

        match self.next_reply() {
            Some(MockReply::Stream(fragments)) => Ok(Box::pin(stream::iter(fragments))),
            Some(MockReply::Stall(fragments)) => {
                Ok(Box::pin(stream::iter(fragments).chain(stream::pending())))
            }
            Some(MockReply::Status(code)) => {
                let status = reqwest::StatusCode::from_u16(code)
                    .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR);
                Err(AgentError::Transport { status }.into())
            }
            None => Ok(Box::pin(stream::empty())),
        }
    }
}
