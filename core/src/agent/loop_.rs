use crate::agent::{Renderer, ToolRegistry, Transcript, UsageTotals};
use crate::config::ChunkJoin;
use crate::error::AgentError;
use crate::traits::{ChatMessage, ChatRequest, DeltaKind, Provider, ToolContext, ToolInvocation};
use anyhow::Result;
use futures_util::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_MAX_ITERATIONS: usize = 8;
const PRIMARY_CHOICE: u32 = 0;

pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tool_registry: Arc<ToolRegistry>,
    max_iterations: usize,
    chunk_join: ChunkJoin,
    workspace: PathBuf,
}

/// Per-turn display and accumulation state, shared across every
/// completion call the turn makes.
#[derive(Default)]
struct TurnState {
    reasoning_header: bool,
    answer_header: bool,
    text_chunks: Vec<String>,
    usage: UsageTotals,
}

impl TurnState {
    fn show_reasoning_header(&mut self, renderer: &mut dyn Renderer) {
        if !self.reasoning_header {
            renderer.reasoning_header();
            self.reasoning_header = true;
        }
    }

    fn show_answer_header(&mut self, renderer: &mut dyn Renderer) {
        if !self.answer_header {
            renderer.answer_header();
            self.answer_header = true;
        }
    }
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, tool_registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tool_registry,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            chunk_join: ChunkJoin::default(),
            workspace: PathBuf::from("."),
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_chunk_join(mut self, chunk_join: ChunkJoin) -> Self {
        self.chunk_join = chunk_join;
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// Runs one user turn against `transcript`, which must already end with
    /// the user's message.
    ///
    /// Completion calls repeat for as long as the model keeps requesting
    /// tools. Each request is recorded as an assistant tool-request message
    /// followed by the results of the tools that exist; unknown tools get no
    /// result. Streamed answer text is stored as one assistant message once
    /// the model stops calling tools. Reasoning is shown but never stored.
    ///
    /// On error the transcript keeps everything appended before the failing
    /// call.
    pub async fn run_turn(
        &self,
        transcript: &mut Transcript,
        renderer: &mut dyn Renderer,
        cancel: CancellationToken,
    ) -> Result<UsageTotals> {
        let tools = self.tool_registry.definitions();
        let ctx = ToolContext::new(&self.workspace, cancel.clone());
        let mut state = TurnState::default();
        let mut iteration = 0;

        loop {
            iteration += 1;
            debug!(iteration, messages = transcript.len(), "Requesting completion");

            let request = ChatRequest {
                messages: transcript.messages(),
                tools: &tools,
            };
            let mut stream = self.provider.chat_stream(request, cancel.clone()).await?;
            let mut saw_tool_call = false;

            loop {
                let fragment = tokio::select! {
                    _ = cancel.cancelled() => break,
                    fragment = stream.next() => match fragment {
                        Some(fragment) => fragment,
                        None => break,
                    },
                };
                if let Some(usage) = &fragment.usage {
                    state.usage.record(usage);
                }
                let Some(choice) = fragment
                    .choices
                    .iter()
                    .find(|c| c.index == PRIMARY_CHOICE)
                else {
                    continue;
                };

                match choice.delta.kind() {
                    DeltaKind::Reasoning(text) => {
                        state.show_reasoning_header(renderer);
                        renderer.reasoning(text);
                    }
                    DeltaKind::ToolCalls(calls) => {
                        state.show_reasoning_header(renderer);
                        saw_tool_call = true;
                        self.run_tool_calls(&ctx, calls, transcript, renderer).await;
                    }
                    DeltaKind::Content(text) => {
                        state.show_answer_header(renderer);
                        renderer.answer(text);
                        state.text_chunks.push(text.to_string());
                    }
                    DeltaKind::Finish(reason) => {
                        debug!(reason, "Finish reason");
                    }
                    DeltaKind::Empty => {
                        if let Some(reason) = choice.finish_reason() {
                            debug!(reason, "Finish reason");
                        }
                    }
                }

                if cancel.is_cancelled() {
                    break;
                }
            }
            drop(stream);

            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled.into());
            }
            if !saw_tool_call {
                break;
            }
            if iteration >= self.max_iterations {
                return Err(AgentError::TurnExhausted {
                    iterations: iteration,
                }
                .into());
            }
        }

        if !state.text_chunks.is_empty() {
            transcript.push(ChatMessage::assistant(
                self.chunk_join.join(&state.text_chunks),
            ));
        }
        renderer.finish();

        debug_assert!(transcript.tool_results_are_paired());
        debug!(iterations = iteration, samples = state.usage.samples, "Turn complete");

        Ok(state.usage)
    }

    async fn run_tool_calls(
        &self,
        ctx: &ToolContext,
        calls: &[ToolInvocation],
        transcript: &mut Transcript,
        renderer: &mut dyn Renderer,
    ) {
        transcript.push(ChatMessage::assistant_tool_request(
            calls.iter().map(ToolInvocation::to_tool_call).collect(),
        ));

        for call in calls {
            renderer.tool_call(call.name(), &call.arguments_json());

            let mut results = Vec::new();
            if self.tool_registry.dispatch(ctx, call, &mut results).await {
                for result in &results {
                    renderer.tool_result(result.text().unwrap_or_default());
                }
            }
            transcript.extend(results);
        }
    }
}
