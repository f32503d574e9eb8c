use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validate::validate_address;

pub const MAX_TOOL_CALLS_CEILING: u32 = 16;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub dialogue: DialogueConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogueConfig {
    pub routing: RoutingMode,
    pub max_tool_calls_per_turn: u32,
    /// Unit named in prompts and accepted after an amount.
    pub currency_label: String,
    /// Tools for a later slot may run; they never settle the turn.
    pub allow_off_route_tools: bool,
    /// Example address shown in the recipient prompt.
    pub recipient_hint: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    Fixed,
    Model,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub routing: Option<RoutingMode>,
    pub max_tool_calls_per_turn: Option<u32>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            routing: RoutingMode::Fixed,
            max_tool_calls_per_turn: 4,
            currency_label: "ETH".to_string(),
            allow_off_route_tools: true,
            recipient_hint: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dialogue: DialogueConfig::default(),
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmConfig {
    /// Configured base URL, or the provider's public default.
    pub fn effective_base_url(&self) -> String {
        let configured = self.base_url.as_deref().map(str::trim).filter(|url| !url.is_empty());
        let url = match (configured, self.provider) {
            (Some(url), _) => url,
            (None, LlmProvider::OpenAi) => "https://api.openai.com/v1",
            (None, LlmProvider::Ollama) => "http://localhost:11434/v1",
        };
        url.trim_end_matches('/').to_string()
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl RoutingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Model => "model",
        }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for RoutingMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "model" => Ok(Self::Model),
            other => Err(ConfigError::Validation(format!(
                "unsupported routing mode `{other}` (expected fixed|model)"
            ))),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dreampool.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(dialogue) = patch.dialogue {
            if let Some(routing) = dialogue.routing {
                self.dialogue.routing = routing;
            }
            if let Some(max_tool_calls_per_turn) = dialogue.max_tool_calls_per_turn {
                self.dialogue.max_tool_calls_per_turn = max_tool_calls_per_turn;
            }
            if let Some(currency_label) = dialogue.currency_label {
                self.dialogue.currency_label = currency_label;
            }
            if let Some(allow_off_route_tools) = dialogue.allow_off_route_tools {
                self.dialogue.allow_off_route_tools = allow_off_route_tools;
            }
            if let Some(recipient_hint) = dialogue.recipient_hint {
                self.dialogue.recipient_hint = Some(recipient_hint);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DREAMPOOL_DIALOGUE_ROUTING") {
            self.dialogue.routing = value.parse()?;
        }
        if let Some(value) = read_env("DREAMPOOL_DIALOGUE_MAX_TOOL_CALLS_PER_TURN") {
            self.dialogue.max_tool_calls_per_turn =
                parse_u32("DREAMPOOL_DIALOGUE_MAX_TOOL_CALLS_PER_TURN", &value)?;
        }
        if let Some(value) = read_env("DREAMPOOL_DIALOGUE_CURRENCY_LABEL") {
            self.dialogue.currency_label = value;
        }
        if let Some(value) = read_env("DREAMPOOL_DIALOGUE_ALLOW_OFF_ROUTE_TOOLS") {
            self.dialogue.allow_off_route_tools =
                parse_bool("DREAMPOOL_DIALOGUE_ALLOW_OFF_ROUTE_TOOLS", &value)?;
        }
        if let Some(value) = read_env("DREAMPOOL_DIALOGUE_RECIPIENT_HINT") {
            self.dialogue.recipient_hint = Some(value);
        }

        if let Some(value) = read_env("DREAMPOOL_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("DREAMPOOL_LLM_API_KEY");
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        } else if self.llm.api_key.is_none() {
            self.llm.api_key = read_env("OPENAI_API_KEY").map(secret_value);
        }
        if let Some(value) = read_env("DREAMPOOL_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("DREAMPOOL_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("DREAMPOOL_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("DREAMPOOL_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DREAMPOOL_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("DREAMPOOL_LLM_MAX_RETRIES", &value)?;
        }

        let log_level =
            read_env("DREAMPOOL_LOGGING_LEVEL").or_else(|| read_env("DREAMPOOL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DREAMPOOL_LOGGING_FORMAT").or_else(|| read_env("DREAMPOOL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(routing) = overrides.routing {
            self.dialogue.routing = routing;
        }
        if let Some(max_tool_calls_per_turn) = overrides.max_tool_calls_per_turn {
            self.dialogue.max_tool_calls_per_turn = max_tool_calls_per_turn;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_dialogue(&self.dialogue)?;
        validate_llm(&self.llm, self.dialogue.routing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The config file `AppConfig::load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("dreampool.toml"), PathBuf::from("config/dreampool.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    if dialogue.max_tool_calls_per_turn == 0
        || dialogue.max_tool_calls_per_turn > MAX_TOOL_CALLS_CEILING
    {
        return Err(ConfigError::Validation(format!(
            "dialogue.max_tool_calls_per_turn must be in range 1..={MAX_TOOL_CALLS_CEILING}"
        )));
    }

    let label = dialogue.currency_label.trim();
    let plain = label.chars().all(|ch| ch.is_ascii_alphanumeric());
    if label.is_empty() || label.len() > 12 || !plain {
        return Err(ConfigError::Validation(
            "dialogue.currency_label must be 1 to 12 ASCII letters or digits".to_string(),
        ));
    }

    if let Some(hint) = &dialogue.recipient_hint {
        validate_address(hint).map_err(|failure| {
            ConfigError::Validation(format!(
                "dialogue.recipient_hint must be a valid recipient address: {failure}"
            ))
        })?;
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig, routing: RoutingMode) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    let base_url = llm.effective_base_url();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    // Fixed routing never talks to the provider.
    if routing == RoutingMode::Model && llm.provider == LlmProvider::OpenAi {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.api_key is required for the openai provider when dialogue.routing = model"
                    .to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    dialogue: Option<DialoguePatch>,
    llm: Option<LlmPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    routing: Option<RoutingMode>,
    max_tool_calls_per_turn: Option<u32>,
    currency_label: Option<String>,
    allow_off_route_tools: Option<bool>,
    recipient_hint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
