//! Translating a model's function call into an executable page query.
//!
//! A [`SynthesizedQuery`] pairs a [`QueryOperation`] with its argument and
//! renders a CDP function declaration that runs with the context element bound
//! to `this`. The argument is embedded as a JSON string literal, which is also
//! a valid JavaScript literal, so quotes, backslashes and line terminators in
//! model output cannot terminate it early.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

use crate::vocabulary::{QueryOperation, QueryVocabulary};

/// A function selected by the model, with its raw JSON-encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedFunction {
    pub name: String,
    pub arguments: String,
}

/// Errors raised while turning a [`SelectedFunction`] into a query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("operation '{0}' is not part of the active vocabulary")]
    UnknownOperation(String),
    #[error("failed to decode function arguments '{raw}': {source}")]
    MalformedArguments {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("function arguments must be a JSON object, got '{raw}'")]
    NotAnObject { raw: String },
    #[error("expected exactly {expected} argument(s), got {found} in '{raw}'")]
    ArgumentCount {
        expected: usize,
        found: usize,
        raw: String,
    },
    #[error("argument '{name}' must be a string")]
    NonStringArgument { name: String },
}

impl QueryError {
    /// Whether asking the model again is a sensible reaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::UnknownOperation(_))
    }
}

/// The model's structured choice: one operation and its string argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SynthesizedQuery {
    operation: QueryOperation,
    argument: String,
}

impl SynthesizedQuery {
    pub fn new(operation: QueryOperation, argument: impl Into<String>) -> Self {
        Self {
            operation,
            argument: argument.into(),
        }
    }

    /// Validate `call` against `vocabulary` and decode its single argument.
    pub fn from_function_call(
        call: &SelectedFunction,
        vocabulary: &QueryVocabulary,
    ) -> Result<Self, QueryError> {
        let spec = vocabulary
            .find(&call.name)
            .ok_or_else(|| QueryError::UnknownOperation(call.name.clone()))?;

        let decoded: JsonValue =
            serde_json::from_str(&call.arguments).map_err(|source| {
                QueryError::MalformedArguments {
                    raw: call.arguments.clone(),
                    source,
                }
            })?;
        let JsonValue::Object(arguments) = decoded else {
            return Err(QueryError::NotAnObject {
                raw: call.arguments.clone(),
            });
        };

        let expected = spec.arguments.len();
        if arguments.len() != expected {
            return Err(QueryError::ArgumentCount {
                expected,
                found: arguments.len(),
                raw: call.arguments.clone(),
            });
        }

        let argument = single_string_argument(arguments)?;
        Ok(Self::new(spec.operation, argument))
    }

    pub fn operation(&self) -> QueryOperation {
        self.operation
    }

    pub fn argument(&self) -> &str {
        &self.argument
    }

    /// Function declaration evaluated with the context element as `this`.
    pub fn expression(&self) -> String {
        let literal = js_string_literal(&self.argument);
        let body = match self.operation {
            QueryOperation::GetElementById => {
                "typeof this.getElementById === 'function' ? this.getElementById(arg) : this.querySelector('#' + CSS.escape(arg))"
            }
            QueryOperation::QuerySelector => "this.querySelector(arg)",
            QueryOperation::GetElementsByClassName => "this.getElementsByClassName(arg)",
            QueryOperation::GetElementsByName => {
                "typeof this.getElementsByName === 'function' ? this.getElementsByName(arg) : this.querySelectorAll('[name=\"' + CSS.escape(arg) + '\"]')"
            }
            QueryOperation::GetElementsByTagName => "this.getElementsByTagName(arg)",
            QueryOperation::QuerySelectorAll => "this.querySelectorAll(arg)",
        };
        format!("function() {{ const arg = {literal}; return {body}; }}")
    }
}

impl fmt::Display for SynthesizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})",
            self.operation.name(),
            js_string_literal(&self.argument)
        )
    }
}

fn single_string_argument(arguments: JsonMap<String, JsonValue>) -> Result<String, QueryError> {
    // Callers guarantee exactly one entry.
    let Some((name, value)) = arguments.into_iter().next() else {
        return Err(QueryError::ArgumentCount {
            expected: 1,
            found: 0,
            raw: "{}".to_string(),
        });
    };
    match value {
        JsonValue::String(value) => Ok(value),
        _ => Err(QueryError::NonStringArgument { name }),
    }
}

fn js_string_literal(value: &str) -> String {
    // Serializing a str cannot fail.
    serde_json::to_string(value).unwrap_or_else(|_| String::from("\"\""))
}
