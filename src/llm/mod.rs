//! Language model client abstractions.
//!
//! This module houses the provider-agnostic completion client along with an
//! OpenAI-backed provider powered by the `async-openai` crate.

pub mod client;
pub mod error;
pub mod openai;
pub mod prompts;
pub mod provider;

pub use client::{
    ChatCompletionOptions, CompletionClient, CompletionOutcome, FunctionCompletion,
    TokenUsage,
};
pub use error::LlmError;
pub use openai::OpenAiChatProvider;
pub use provider::ChatCompletionProvider;
