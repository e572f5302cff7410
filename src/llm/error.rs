use thiserror::Error;

use async_openai::error::OpenAIError;

/// Errors surfaced by the completion client layer.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing OpenAI API key; set MODEL_API_KEY or OPENAI_API_KEY")]
    MissingApiKey,
    #[error("missing default model configuration")]
    MissingDefaultModel,
    #[error("invalid chat completion request: {0}")]
    InvalidRequest(String),
    #[error("chat completion response contained no choices")]
    EmptyResponse,
    #[error(transparent)]
    OpenAi(#[from] OpenAIError),
}
