use thiserror::Error;

/// Failures a caller may want to branch on. They travel inside
/// `anyhow::Error`; recover them with `downcast_ref::<AgentError>()`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM API returned {status}")]
    Transport { status: reqwest::StatusCode },

    #[error("LLM API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Tool loop exhausted after {iterations} iterations")]
    TurnExhausted { iterations: usize },

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),
}
