use crate::render::ConsoleRenderer;
use anyhow::{Context, Result};
use chatloop_core::{AgentError, AgentLoop, ChatMessage, Transcript, UsageTotals};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Line-oriented chat session. Owns the transcript for the life of the
/// process; each non-blank input line drives one agent turn.
pub struct Repl<R, W> {
    input: R,
    renderer: ConsoleRenderer<W>,
    agent: AgentLoop,
    transcript: Transcript,
    interrupts: mpsc::Receiver<()>,
    turn_timeout: Option<Duration>,
    exit_on_turn_error: bool,
}

/// Forwards Ctrl-C presses for the rest of the process. The handler is
/// installed once; presses nobody has picked up yet are coalesced.
pub fn ctrl_c_interrupts() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if let Err(mpsc::error::TrySendError::Closed(())) = tx.try_send(()) {
                break;
            }
        }
        warn!("Ctrl-C handler stopped");
    });
    rx
}

impl<R, W> Repl<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write + Send,
{
    pub fn new(input: R, output: W, agent: AgentLoop, system_prompt: impl Into<String>) -> Self {
        let (_, interrupts) = mpsc::channel(1);
        Self {
            input,
            renderer: ConsoleRenderer::new(output),
            agent,
            transcript: Transcript::new(system_prompt),
            interrupts,
            turn_timeout: None,
            exit_on_turn_error: false,
        }
    }

    /// Interrupt source. During a turn an interrupt cancels the turn; at
    /// the prompt it ends the session.
    pub fn with_interrupts(mut self, interrupts: mpsc::Receiver<()>) -> Self {
        self.interrupts = interrupts;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn with_exit_on_turn_error(mut self, exit: bool) -> Self {
        self.exit_on_turn_error = exit;
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn output(&self) -> &W {
        self.renderer.get_ref()
    }

    /// Runs until end of input or an interrupt at the prompt. Turn failures
    /// are reported and the session carries on, unless the session was
    /// built to stop on them.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.renderer.user_prompt();
            let line = tokio::select! {
                biased;
                line = read_line(&mut self.input) => line?,
                Some(()) = self.interrupts.recv() => {
                    debug!("Interrupted at prompt");
                    self.renderer.goodbye();
                    return Ok(());
                }
            };
            let Some(line) = line else {
                debug!("End of input");
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }

            self.transcript.push(ChatMessage::user(line));
            self.renderer.agent_prompt();

            match self.run_turn().await {
                Ok(usage) => self.renderer.usage(&usage),
                Err(e) if matches!(e.downcast_ref::<AgentError>(), Some(AgentError::Cancelled)) => {
                    self.renderer.interrupted();
                }
                Err(e) => {
                    self.renderer.error(&e);
                    if self.exit_on_turn_error {
                        return Err(e);
                    }
                }
            }

            // A press that raced the end of the turn must not close the session.
            while self.interrupts.try_recv().is_ok() {}
        }
    }

    /// One turn under a fresh token, cancelled by an interrupt or once the
    /// turn timeout passes.
    async fn run_turn(&mut self) -> Result<UsageTotals> {
        let cancel = CancellationToken::new();
        let turn = self
            .agent
            .run_turn(&mut self.transcript, &mut self.renderer, cancel.clone());
        tokio::pin!(turn);

        let timeout = self.turn_timeout;
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                result = &mut turn => return result,
                Some(()) = self.interrupts.recv(), if !cancel.is_cancelled() => {
                    debug!("Turn interrupted");
                    cancel.cancel();
                }
                _ = &mut deadline, if !cancel.is_cancelled() => {
                    warn!(?timeout, "Turn timed out");
                    cancel.cancel();
                }
            }
        }
    }
}

/// One line without its terminator, or `None` at end of input.
async fn read_line<R: AsyncBufRead + Unpin>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;
    if read == 0 {
        return Ok(None);
    }
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(Some(line))
}
