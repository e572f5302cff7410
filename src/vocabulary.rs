//! The fixed catalogs of DOM query operations a model may choose from.
//!
//! Operations form a closed set; each one knows its DOM method name, the
//! description shown to the model and its argument list. Every operation in
//! the current catalogs takes one string argument, but [`OperationSpec`]
//! carries a slice so wider operations only need a longer list.

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue, json};

/// Whether a lookup resolves to one element or to a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    Single,
    Multiple,
}

impl SelectionMode {
    pub fn label(self) -> &'static str {
        match self {
            SelectionMode::Single => "single",
            SelectionMode::Multiple => "multiple",
        }
    }
}

/// DOM query operations known to the explorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryOperation {
    #[serde(rename = "getElementById")]
    GetElementById,
    #[serde(rename = "querySelector")]
    QuerySelector,
    #[serde(rename = "getElementsByClassName")]
    GetElementsByClassName,
    #[serde(rename = "getElementsByName")]
    GetElementsByName,
    #[serde(rename = "getElementsByTagName")]
    GetElementsByTagName,
    #[serde(rename = "querySelectorAll")]
    QuerySelectorAll,
}

impl QueryOperation {
    pub const ALL: [QueryOperation; 6] = [
        QueryOperation::GetElementById,
        QueryOperation::QuerySelector,
        QueryOperation::GetElementsByClassName,
        QueryOperation::GetElementsByName,
        QueryOperation::GetElementsByTagName,
        QueryOperation::QuerySelectorAll,
    ];

    /// DOM method name, also used as the function name offered to the model.
    pub fn name(self) -> &'static str {
        match self {
            QueryOperation::GetElementById => "getElementById",
            QueryOperation::QuerySelector => "querySelector",
            QueryOperation::GetElementsByClassName => "getElementsByClassName",
            QueryOperation::GetElementsByName => "getElementsByName",
            QueryOperation::GetElementsByTagName => "getElementsByTagName",
            QueryOperation::QuerySelectorAll => "querySelectorAll",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|operation| operation.name() == name.trim())
    }

    pub fn mode(self) -> SelectionMode {
        match self {
            QueryOperation::GetElementById | QueryOperation::QuerySelector => SelectionMode::Single,
            _ => SelectionMode::Multiple,
        }
    }

    pub fn spec(self) -> OperationSpec {
        match self {
            QueryOperation::GetElementById => OperationSpec {
                operation: self,
                description: "Returns an Element representing the element whose id property matches the specified string",
                arguments: &[ArgumentSpec {
                    name: "id",
                    description: "The ID of the element to locate.",
                }],
            },
            QueryOperation::QuerySelector => OperationSpec {
                operation: self,
                description: "Returns the first Element within the document that matches the specified selector, or group of selectors. If no matches are found, null is returned.",
                arguments: &[ArgumentSpec {
                    name: "selectors",
                    description: "A string containing one or more selectors to match. This string must be a valid CSS selector string.",
                }],
            },
            QueryOperation::GetElementsByClassName => OperationSpec {
                operation: self,
                description: "Returns a list of all Elements which have all of the given class name(s).",
                arguments: &[ArgumentSpec {
                    name: "names",
                    description: "A string representing the class name(s) to match; multiple class names are separated by whitespace.",
                }],
            },
            QueryOperation::GetElementsByName => OperationSpec {
                operation: self,
                description: "Returns a list of Elements with a given name attribute in the document.",
                arguments: &[ArgumentSpec {
                    name: "name",
                    description: "The value of the name attribute of the element(s) we are looking for.",
                }],
            },
            QueryOperation::GetElementsByTagName => OperationSpec {
                operation: self,
                description: "Returns a list of Elements with the given tag name.",
                arguments: &[ArgumentSpec {
                    name: "name",
                    description: "A string representing the name of the elements. The special string * represents all elements.",
                }],
            },
            QueryOperation::QuerySelectorAll => OperationSpec {
                operation: self,
                description: "Returns a list of Elements that match the specified group of selectors.",
                arguments: &[ArgumentSpec {
                    name: "selectors",
                    description: "A string containing one or more selectors to match. This string must be a valid CSS selector string.",
                }],
            },
        }
    }
}

/// A string argument accepted by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// Model-facing description of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub operation: QueryOperation,
    pub description: &'static str,
    pub arguments: &'static [ArgumentSpec],
}

impl OperationSpec {
    pub fn name(&self) -> &'static str {
        self.operation.name()
    }

    /// JSON schema of the argument object, every argument a required string.
    pub fn parameters_schema(&self) -> JsonValue {
        let properties: JsonMap<String, JsonValue> = self
            .arguments
            .iter()
            .map(|argument| {
                (
                    argument.name.to_string(),
                    json!({
                        "type": "string",
                        "description": argument.description,
                    }),
                )
            })
            .collect();
        let required: Vec<&str> = self.arguments.iter().map(|argument| argument.name).collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Ordered, immutable catalog of operations for one selection mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryVocabulary {
    mode: SelectionMode,
    operations: Vec<OperationSpec>,
}

impl QueryVocabulary {
    /// Lookup by id and first match by selector.
    pub fn single() -> Self {
        Self::from_operations(
            SelectionMode::Single,
            &[QueryOperation::GetElementById, QueryOperation::QuerySelector],
        )
    }

    /// By class, by name, by tag and all matches by selector.
    pub fn multiple() -> Self {
        Self::from_operations(
            SelectionMode::Multiple,
            &[
                QueryOperation::GetElementsByClassName,
                QueryOperation::GetElementsByName,
                QueryOperation::GetElementsByTagName,
                QueryOperation::QuerySelectorAll,
            ],
        )
    }

    fn from_operations(mode: SelectionMode, operations: &[QueryOperation]) -> Self {
        Self {
            mode,
            operations: operations.iter().map(|operation| operation.spec()).collect(),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn operations(&self) -> &[OperationSpec] {
        &self.operations
    }

    /// Resolve a model-supplied function name against this catalog.
    pub fn find(&self, name: &str) -> Option<&OperationSpec> {
        let operation = QueryOperation::parse(name)?;
        self.operations
            .iter()
            .find(|spec| spec.operation == operation)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
