//! The selector synthesizer.
//!
//! [`DomExplorer`] turns a natural-language description of an element into a
//! DOM query by asking a language model to pick one operation from a fixed
//! vocabulary, runs the query against the live element and remembers the
//! first query that works for each prompt.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::browser::{BrowserError, ElementBackend};
use crate::cache::SelectorCache;
use crate::config::{DEFAULT_MAX_TRIALS, ExplorerConfig};
use crate::execution::{Execution, ExecutionAdapter};
use crate::llm::{
    ChatCompletionProvider, CompletionClient, CompletionOutcome, LlmError, OpenAiChatProvider,
    prompts::build_selector_prompt,
};
use crate::logging::{ExplorerLogRecord, ExplorerLogger, LogCallback};
use crate::metrics::ExplorerMetrics;
use crate::query::{QueryError, SynthesizedQuery};
use crate::sanitize::sanitize;
use crate::vocabulary::{QueryVocabulary, SelectionMode};

const LOG_CATEGORY: &str = "dom_explorer";

#[derive(Debug, Error)]
pub enum ExplorerError {
    /// A query failed in the page. Only surfaced from the cached path; inside
    /// the synthesis loop this triggers another trial.
    #[error("query evaluation failed: {0}")]
    Evaluation(#[source] BrowserError),
    #[error("model answered without selecting a function: {text:?}")]
    NoFunctionCall { text: String },
    #[error("model returned unusable function arguments: {0}")]
    ArgumentParse(#[source] QueryError),
    #[error("could not synthesize a working query for {prompt:?} after {trials} trial(s)")]
    BudgetExhausted {
        prompt: String,
        trials: usize,
        last_error: Option<String>,
    },
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("failed to read element html: {0}")]
    Browser(#[source] BrowserError),
}

/// Synthesizes, runs and caches DOM queries described in natural language.
///
/// Lookups take `&mut self`, so one explorer serves one caller at a time;
/// share it behind a `tokio::sync::Mutex` when several tasks need it.
pub struct DomExplorer<P: ChatCompletionProvider> {
    client: CompletionClient<P>,
    logger: ExplorerLogger,
    cache: SelectorCache,
    metrics: ExplorerMetrics,
    max_trials: usize,
    instructions: Option<String>,
    single: QueryVocabulary,
    multiple: QueryVocabulary,
}

impl<P: ChatCompletionProvider> DomExplorer<P> {
    pub fn new(client: CompletionClient<P>) -> Self {
        Self {
            client,
            logger: ExplorerLogger::default(),
            cache: SelectorCache::new(),
            metrics: ExplorerMetrics::default(),
            max_trials: DEFAULT_MAX_TRIALS,
            instructions: None,
            single: QueryVocabulary::single(),
            multiple: QueryVocabulary::multiple(),
        }
    }

    pub fn with_logger(mut self, logger: ExplorerLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Number of model-backed attempts per lookup; values below one are raised to one.
    pub fn with_max_trials(mut self, max_trials: usize) -> Self {
        self.max_trials = max_trials.max(1);
        self
    }

    /// Extra guidance appended to every selector prompt.
    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn client(&self) -> &CompletionClient<P> {
        &self.client
    }

    pub fn logger(&self) -> &ExplorerLogger {
        &self.logger
    }

    pub fn max_trials(&self) -> usize {
        self.max_trials
    }

    pub fn cache(&self) -> &SelectorCache {
        &self.cache
    }

    /// Forget every cached query for `prompt`, returning how many were dropped.
    pub fn evict(&mut self, prompt: &str) -> usize {
        self.cache.evict(prompt)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn metrics(&self) -> &ExplorerMetrics {
        &self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics = ExplorerMetrics::default();
    }

    /// Locate the single element described by `prompt` inside `element`.
    ///
    /// `Ok(None)` means a query ran successfully but matched nothing; such
    /// queries are not cached.
    pub async fn get_element<B: ElementBackend>(
        &mut self,
        backend: &B,
        element: &B::Handle,
        prompt: &str,
    ) -> Result<Option<B::Handle>, ExplorerError> {
        match self
            .resolve(backend, element, prompt, SelectionMode::Single)
            .await?
        {
            Execution::Single(handle) => Ok(handle),
            Execution::Multiple(_) => Err(ExplorerError::Evaluation(BrowserError::Unexpected(
                "collection returned for a single-element lookup".into(),
            ))),
        }
    }

    /// Locate every element described by `prompt` inside `element`, in
    /// collection order.
    pub async fn get_elements<B: ElementBackend>(
        &mut self,
        backend: &B,
        element: &B::Handle,
        prompt: &str,
    ) -> Result<Vec<B::Handle>, ExplorerError> {
        match self
            .resolve(backend, element, prompt, SelectionMode::Multiple)
            .await?
        {
            Execution::Multiple(handles) => Ok(handles),
            Execution::Single(_) => Err(ExplorerError::Evaluation(BrowserError::Unexpected(
                "single element returned for a collection lookup".into(),
            ))),
        }
    }

    async fn resolve<B: ElementBackend>(
        &mut self,
        backend: &B,
        element: &B::Handle,
        prompt: &str,
        mode: SelectionMode,
    ) -> Result<Execution<B::Handle>, ExplorerError> {
        let adapter = ExecutionAdapter::new(backend);

        if let Some(query) = self.cache.get(mode, prompt).cloned() {
            self.metrics.record_cache_hit();
            self.logger.debug(
                format!("using cached query {query}"),
                Some(LOG_CATEGORY),
                Some(json!({ "prompt": prompt, "mode": mode.label() })),
            );
            return adapter
                .evaluate(element, &query)
                .await
                .map_err(ExplorerError::Evaluation);
        }

        let vocabulary = match mode {
            SelectionMode::Single => &self.single,
            SelectionMode::Multiple => &self.multiple,
        };
        let mut last_error = None;

        for trial in 1..=self.max_trials {
            let raw = backend
                .outer_html(element)
                .await
                .map_err(ExplorerError::Browser)?;
            let sanitized = sanitize(&raw);
            if sanitized.is_degraded() {
                self.logger.debug(
                    "element html needed repair before prompting",
                    Some(LOG_CATEGORY),
                    Some(json!({ "parse_errors": sanitized.parse_errors.len() })),
                );
            }

            let query_prompt =
                build_selector_prompt(prompt, &sanitized.html, self.instructions.as_deref());
            let completion = self
                .client
                .complete_with_functions(&query_prompt, vocabulary)
                .await?;
            self.metrics.record(
                mode,
                completion.usage.prompt_tokens,
                completion.usage.completion_tokens,
                completion.inference_time_ms,
            );

            let call = match completion.outcome {
                CompletionOutcome::FunctionCall(call) => call,
                CompletionOutcome::PlainText(text) => {
                    return Err(ExplorerError::NoFunctionCall { text });
                }
            };

            let query = match SynthesizedQuery::from_function_call(&call, vocabulary) {
                Ok(query) => query,
                Err(err) if err.is_retryable() => {
                    self.metrics.record_failed_trial();
                    self.logger.debug(
                        format!("model chose an unavailable operation, re-trying: {err}"),
                        Some(LOG_CATEGORY),
                        Some(json!({ "prompt": prompt, "trial": trial })),
                    );
                    last_error = Some(err.to_string());
                    continue;
                }
                Err(err) => return Err(ExplorerError::ArgumentParse(err)),
            };

            self.logger.debug(
                format!("trying query {query}"),
                Some(LOG_CATEGORY),
                Some(json!({
                    "prompt": prompt,
                    "trial": trial,
                    "expression": query.expression(),
                })),
            );

            match adapter.evaluate(element, &query).await {
                Ok(Execution::Single(None)) => {
                    self.logger.info(
                        format!("query {query} matched nothing"),
                        Some(LOG_CATEGORY),
                        Some(json!({ "prompt": prompt, "trial": trial })),
                    );
                    return Ok(Execution::Single(None));
                }
                Ok(execution) => {
                    self.logger.info(
                        format!("synthesized query {query}"),
                        Some(LOG_CATEGORY),
                        Some(json!({
                            "prompt": prompt,
                            "trial": trial,
                            "matches": execution.len(),
                        })),
                    );
                    self.cache.insert(mode, prompt, query);
                    return Ok(execution);
                }
                Err(err) => {
                    self.metrics.record_failed_trial();
                    self.logger.debug(
                        format!("query {query} failed with error {err}, re-trying"),
                        Some(LOG_CATEGORY),
                        Some(json!({ "prompt": prompt, "trial": trial })),
                    );
                    last_error = Some(err.to_string());
                }
            }
        }

        self.logger.error(
            format!("no working query after {} trial(s)", self.max_trials),
            Some(LOG_CATEGORY),
            Some(json!({ "prompt": prompt, "last_error": last_error })),
        );
        Err(ExplorerError::BudgetExhausted {
            prompt: prompt.to_string(),
            trials: self.max_trials,
            last_error,
        })
    }
}

impl DomExplorer<OpenAiChatProvider> {
    /// Wire an OpenAI-backed explorer from configuration.
    ///
    /// The configuration's plain-text logger, when set, receives both the
    /// completion client's lines and the explorer's formatted records.
    pub fn from_config(config: &ExplorerConfig) -> Result<Self, ExplorerError> {
        let client = CompletionClient::from_config(config)?;
        let mut logger = ExplorerLogger::new(config.verbose);
        if let Some(callback) = config.logger.clone() {
            let sink: LogCallback = Arc::new(move |record: &ExplorerLogRecord| {
                callback(&record.compact_line());
            });
            logger.set_external_logger(Some(sink));
        }

        Ok(DomExplorer::new(client)
            .with_logger(logger)
            .with_max_trials(config.max_trials)
            .with_instructions(config.instructions.clone()))
    }
}
