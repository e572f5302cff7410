use std::fmt;

use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, ChatCompletionTool, ChatCompletionToolArgs,
    ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    CreateChatCompletionResponse, FunctionObjectArgs,
};

use crate::config::{ExplorerConfig, LoggerCallback};
use crate::metrics::{get_inference_time_ms, start_inference_timer};
use crate::query::SelectedFunction;
use crate::vocabulary::QueryVocabulary;

use super::error::LlmError;
use super::openai::OpenAiChatProvider;
use super::provider::ChatCompletionProvider;

/// Optional sampling parameters applied to every selector request.
#[derive(Debug, Default, Clone)]
pub struct ChatCompletionOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// Token usage reported by the provider for one completion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// What the model chose to do with the offered vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    FunctionCall(SelectedFunction),
    /// The model answered in prose instead of selecting a function.
    PlainText(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCompletion {
    pub outcome: CompletionOutcome,
    pub usage: TokenUsage,
    pub inference_time_ms: u64,
}

/// Completion client that offers a query vocabulary as callable functions.
pub struct CompletionClient<P: ChatCompletionProvider> {
    provider: P,
    default_model: String,
    options: ChatCompletionOptions,
    logger: Option<LoggerCallback>,
}

impl<P> fmt::Debug for CompletionClient<P>
where
    P: ChatCompletionProvider + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionClient")
            .field("provider", &self.provider)
            .field("default_model", &self.default_model)
            .field("options", &self.options)
            .field("logger_attached", &self.logger.is_some())
            .finish()
    }
}

impl<P: ChatCompletionProvider> CompletionClient<P> {
    pub fn new(default_model: impl Into<String>, provider: P) -> Self {
        Self {
            provider,
            default_model: default_model.into(),
            options: ChatCompletionOptions::default(),
            logger: None,
        }
    }

    pub fn with_options(mut self, options: ChatCompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_logger(mut self, logger: Option<LoggerCallback>) -> Self {
        self.logger = logger;
        self
    }

    pub fn set_logger(&mut self, logger: Option<LoggerCallback>) {
        self.logger = logger;
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Access the underlying provider (primarily for testing).
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Build the request sent for `prompt`, exposing `vocabulary` as tools.
    pub fn build_request(
        &self,
        prompt: &str,
        vocabulary: &QueryVocabulary,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let model = self
            .options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        if model.trim().is_empty() {
            return Err(LlmError::MissingDefaultModel);
        }

        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Text(
                prompt.to_string(),
            ))
            .build()
            .map_err(|err| LlmError::InvalidRequest(err.to_string()))?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(model);
        builder.messages(vec![ChatCompletionRequestMessage::User(message)]);
        builder.tools(vocabulary_tools(vocabulary)?);
        builder.parallel_tool_calls(false);
        apply_options(&mut builder, &self.options);

        builder
            .build()
            .map_err(|err| LlmError::InvalidRequest(err.to_string()))
    }

    /// Ask the model to select one operation of `vocabulary` for `prompt`.
    pub async fn complete_with_functions(
        &self,
        prompt: &str,
        vocabulary: &QueryVocabulary,
    ) -> Result<FunctionCompletion, LlmError> {
        let request = self.build_request(prompt, vocabulary)?;
        let model = request.model.clone();
        let mode = vocabulary.mode().label();
        self.log_debug(&format!(
            "Sending chat completion request to model={model} vocabulary={mode}"
        ));

        let start = start_inference_timer();
        let response = match self.provider.create_chat_completion(request).await {
            Ok(response) => response,
            Err(err) => {
                self.log_error(&format!("Chat completion failed for model={model}: {err}"));
                return Err(LlmError::OpenAi(err));
            }
        };
        let inference_time_ms = get_inference_time_ms(start);
        self.log_debug(&format!(
            "Chat completion succeeded: model={model} duration={inference_time_ms}ms"
        ));

        let usage = response
            .usage
            .as_ref()
            .map(|usage| TokenUsage {
                prompt_tokens: u64::from(usage.prompt_tokens),
                completion_tokens: u64::from(usage.completion_tokens),
            })
            .unwrap_or_default();
        let outcome = interpret_response(response)?;

        Ok(FunctionCompletion {
            outcome,
            usage,
            inference_time_ms,
        })
    }

    fn log_debug(&self, message: &str) {
        if let Some(logger) = &self.logger {
            logger(&format!("[llm][debug] {message}"));
        }
    }

    fn log_error(&self, message: &str) {
        if let Some(logger) = &self.logger {
            logger(&format!("[llm][error] {message}"));
        }
    }
}

impl CompletionClient<OpenAiChatProvider> {
    /// Convenience constructor that wires the OpenAI provider using `ExplorerConfig`.
    pub fn from_config(config: &ExplorerConfig) -> Result<Self, LlmError> {
        let provider = OpenAiChatProvider::from_config(config)?;
        let options = ChatCompletionOptions {
            model: None,
            temperature: config.temperature,
        };
        let mut client =
            CompletionClient::new(config.model_name.as_str(), provider).with_options(options);
        client.set_logger(config.logger.clone());
        Ok(client)
    }
}

fn vocabulary_tools(vocabulary: &QueryVocabulary) -> Result<Vec<ChatCompletionTool>, LlmError> {
    vocabulary
        .operations()
        .iter()
        .map(|spec| {
            let function = FunctionObjectArgs::default()
                .name(spec.name())
                .description(spec.description)
                .parameters(spec.parameters_schema())
                .build()
                .map_err(|err| LlmError::InvalidRequest(err.to_string()))?;
            ChatCompletionToolArgs::default()
                .r#type(ChatCompletionToolType::Function)
                .function(function)
                .build()
                .map_err(|err| LlmError::InvalidRequest(err.to_string()))
        })
        .collect()
}

#[allow(deprecated)]
fn interpret_response(response: CreateChatCompletionResponse) -> Result<CompletionOutcome, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(LlmError::EmptyResponse)?;
    let message = choice.message;

    let tool_call = message
        .tool_calls
        .and_then(|calls| calls.into_iter().next())
        .map(|call| call.function);
    if let Some(call) = tool_call.or(message.function_call) {
        return Ok(CompletionOutcome::FunctionCall(SelectedFunction {
            name: call.name,
            arguments: call.arguments,
        }));
    }

    Ok(CompletionOutcome::PlainText(message.content.unwrap_or_default()))
}

fn apply_options(builder: &mut CreateChatCompletionRequestArgs, options: &ChatCompletionOptions) {
    if let Some(temperature) = options.temperature {
        builder.temperature(temperature);
    }
}
