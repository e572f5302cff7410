//! Strongly-typed configuration for the explorer.
//!
//! Values can be constructed from defaults, loaded from environment variables
//! (with optional `.env` support), or merged with explicit overrides.

use std::env;
use std::fmt;
use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;
use std::sync::Arc;

use dotenvy::dotenv;
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize as DeriveDeserialize, Serialize as DeriveSerialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

type JsonObject = JsonMap<String, JsonValue>;

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL_NAME: &str = "gpt-4o-mini";

/// Number of model invocations allowed per unresolved prompt.
pub const DEFAULT_MAX_TRIALS: usize = 10;

/// Shared logger callback signature for plain-text collaborator logs.
pub type LoggerCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Verbosity level for explorer logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Minimal,
    #[default]
    Medium,
    Detailed,
}

impl Verbosity {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Verbosity::from_u8(value).ok_or_else(|| {
            DeError::custom(format!(
                "invalid verbosity value {value}; expected 0, 1, or 2"
            ))
        })
    }
}

/// Configuration values for the explorer, its model client and the local browser.
#[derive(DeriveSerialize, DeriveDeserialize, Clone)]
#[serde(default)]
pub struct ExplorerConfig {
    #[serde(alias = "modelName")]
    pub model_name: String,
    #[serde(alias = "modelApiKey")]
    pub model_api_key: Option<String>,
    #[serde(alias = "modelClientOptions")]
    pub model_client_options: Option<JsonObject>,
    #[serde(alias = "maxTrials")]
    pub max_trials: usize,
    pub temperature: Option<f32>,
    /// Extra guidance appended to every selector prompt.
    pub instructions: Option<String>,
    #[serde(skip_serializing, skip_deserializing)]
    pub logger: Option<LoggerCallback>,
    pub verbose: Verbosity,
    pub headless: bool,
    #[serde(alias = "chromeExecutable")]
    pub chrome_executable: Option<PathBuf>,
    #[serde(alias = "cdpUrl")]
    pub cdp_url: Option<String>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        ExplorerConfig {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            model_api_key: None,
            model_client_options: None,
            max_trials: DEFAULT_MAX_TRIALS,
            temperature: None,
            instructions: None,
            logger: None,
            verbose: Verbosity::default(),
            headless: true,
            chrome_executable: None,
            cdp_url: None,
        }
    }
}

impl ExplorerConfig {
    /// Construct a configuration from environment variables, after loading a
    /// `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        let mut config = ExplorerConfig::default();

        if let Some(value) = env_var("DOM_EXPLORER_MODEL").or_else(|| env_var("MODEL_NAME")) {
            config.model_name = value;
        }

        if let Some(value) = env_var("MODEL_API_KEY") {
            config.model_api_key = Some(value);
        }

        if let Some(value) = env_var("DOM_EXPLORER_MODEL_CLIENT_OPTIONS") {
            config.model_client_options =
                Some(parse_json_object("DOM_EXPLORER_MODEL_CLIENT_OPTIONS", &value)?);
        }

        if let Some(value) = env_var("DOM_EXPLORER_MAX_TRIALS") {
            let parsed = parse_usize("DOM_EXPLORER_MAX_TRIALS", &value)?;
            if parsed == 0 {
                return Err(ConfigError::OutOfRange {
                    field: "DOM_EXPLORER_MAX_TRIALS",
                    value,
                });
            }
            config.max_trials = parsed;
        }

        if let Some(value) = env_var("DOM_EXPLORER_TEMPERATURE") {
            config.temperature = Some(parse_f32("DOM_EXPLORER_TEMPERATURE", &value)?);
        }

        if let Some(value) = env_var("DOM_EXPLORER_VERBOSE") {
            let parsed = parse_u8("DOM_EXPLORER_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed).ok_or(ConfigError::OutOfRange {
                field: "DOM_EXPLORER_VERBOSE",
                value,
            })?;
        }

        if let Some(value) = env_var("DOM_EXPLORER_INSTRUCTIONS") {
            config.instructions = Some(value);
        }

        if let Some(value) = env_var("DOM_EXPLORER_HEADLESS") {
            config.headless = parse_bool("DOM_EXPLORER_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("DOM_EXPLORER_CHROME_BIN") {
            config.chrome_executable = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("DOM_EXPLORER_CDP_URL") {
            config.cdp_url = Some(value);
        }

        Ok(config)
    }

    /// Create a new configuration with explicit field overrides applied.
    pub fn with_overrides(&self, overrides: ExplorerConfigOverrides) -> ExplorerConfig {
        let mut next = self.clone();

        if let Some(value) = overrides.model_name {
            next.model_name = value;
        }
        if let Some(value) = overrides.model_api_key {
            next.model_api_key = value;
        }
        if let Some(value) = overrides.model_client_options {
            next.model_client_options = value;
        }
        if let Some(value) = overrides.max_trials {
            next.max_trials = value.max(1);
        }
        if let Some(value) = overrides.temperature {
            next.temperature = value;
        }
        if let Some(value) = overrides.instructions {
            next.instructions = value;
        }
        if let Some(value) = overrides.logger {
            next.logger = value;
        }
        if let Some(value) = overrides.verbose {
            next.verbose = value;
        }
        if let Some(value) = overrides.headless {
            next.headless = value;
        }
        if let Some(value) = overrides.chrome_executable {
            next.chrome_executable = value;
        }
        if let Some(value) = overrides.cdp_url {
            next.cdp_url = value;
        }

        next
    }
}

/// Field-level overrides for [`ExplorerConfig::with_overrides`].
#[derive(Default, Clone)]
pub struct ExplorerConfigOverrides {
    pub model_name: Option<String>,
    pub model_api_key: Option<Option<String>>,
    pub model_client_options: Option<Option<JsonObject>>,
    pub max_trials: Option<usize>,
    pub temperature: Option<Option<f32>>,
    pub instructions: Option<Option<String>>,
    pub logger: Option<Option<LoggerCallback>>,
    pub verbose: Option<Verbosity>,
    pub headless: Option<bool>,
    pub chrome_executable: Option<Option<PathBuf>>,
    pub cdp_url: Option<Option<String>>,
}

impl ExplorerConfigOverrides {
    pub fn model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    pub fn max_trials(mut self, max_trials: usize) -> Self {
        self.max_trials = Some(max_trials);
        self
    }
}

impl fmt::Debug for ExplorerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplorerConfig")
            .field("model_name", &self.model_name)
            .field(
                "model_api_key",
                &self.model_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("model_client_options", &self.model_client_options)
            .field("max_trials", &self.max_trials)
            .field("temperature", &self.temperature)
            .field("instructions", &self.instructions)
            .field("verbose", &self.verbose)
            .field("headless", &self.headless)
            .field("chrome_executable", &self.chrome_executable)
            .field("cdp_url", &self.cdp_url)
            .field("logger_present", &self.logger.is_some())
            .finish()
    }
}

impl fmt::Debug for ExplorerConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplorerConfigOverrides")
            .field("model_name", &self.model_name)
            .field("max_trials", &self.max_trials)
            .field("temperature", &self.temperature)
            .field("instructions", &self.instructions)
            .field("logger", &self.logger.as_ref().map(|inner| inner.is_some()))
            .field("verbose", &self.verbose)
            .field("headless", &self.headless)
            .field("chrome_executable", &self.chrome_executable)
            .field("cdp_url", &self.cdp_url)
            .finish()
    }
}

/// Errors that can arise while constructing an [`ExplorerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("value '{value}' is out of range for {field}")]
    OutOfRange { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid decimal '{value}' for {field}: {source}")]
    InvalidDecimal {
        field: &'static str,
        value: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("{field} must be a JSON object")]
    InvalidJsonType { field: &'static str },
    #[error("invalid JSON for {field}: {source}")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, ConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_usize(field: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_f32(field: &'static str, value: &str) -> Result<f32, ConfigError> {
    value
        .trim()
        .parse::<f32>()
        .map_err(|source| ConfigError::InvalidDecimal {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_json_object(field: &'static str, value: &str) -> Result<JsonObject, ConfigError> {
    let parsed: JsonValue = serde_json::from_str(value)
        .map_err(|source| ConfigError::InvalidJson { field, source })?;
    match parsed {
        JsonValue::Object(map) => Ok(map),
        _ => Err(ConfigError::InvalidJsonType { field }),
    }
}
