//! Locate DOM elements from natural-language descriptions.
//!
//! A [`DomExplorer`] asks a language model to choose one DOM query operation
//! and its argument for a described element, runs that query against a live
//! element through an [`ElementBackend`], retries with a fresh model call when
//! the query fails, and caches the first working query per prompt.

pub mod adapter;
pub mod browser;
pub mod cache;
pub mod config;
pub mod execution;
pub mod explorer;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod query;
pub mod runtime;
pub mod sanitize;
pub mod vocabulary;

pub use adapter::{ChromiumoxideBackend, RemoteElement};
pub use browser::{BrowserError, ElementBackend};
pub use cache::SelectorCache;
pub use config::{ConfigError, ExplorerConfig, ExplorerConfigOverrides, Verbosity};
pub use execution::{Execution, ExecutionAdapter};
pub use explorer::{DomExplorer, ExplorerError};
pub use llm::{CompletionClient, LlmError};
pub use logging::{ExplorerLogRecord, ExplorerLogger};
pub use metrics::ExplorerMetrics;
pub use query::{QueryError, SelectedFunction, SynthesizedQuery};
pub use runtime::{ChromiumoxideRuntime, LaunchStrategy, RuntimeError};
pub use sanitize::{SanitizedHtml, sanitize, sanitize_html};
pub use vocabulary::{QueryOperation, QueryVocabulary, SelectionMode};
