use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful shopping assistant for an online store. \
Use the available tools to look up products, search the catalog, show product details, \
and place orders. Always confirm the products and quantities with the customer before \
placing an order, and report prices exactly as the tools return them.";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub name: String,
    pub system_prompt: String,
    pub cost_tracking: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub store_base_url: Option<String>,
    pub cost_tracking: Option<bool>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "llama3.1".to_string(),
                timeout_secs: 120,
            },
            store: StoreConfig { base_url: None, api_key: None, timeout_secs: 10 },
            agent: AgentConfig {
                name: "shopping-assistant".to_string(),
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
                cost_tracking: false,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("shopkeep.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(store) = patch.store {
            if let Some(base_url) = store.base_url {
                self.store.base_url = Some(base_url);
            }
            if let Some(store_api_key_value) = store.api_key {
                self.store.api_key = Some(secret_value(store_api_key_value));
            }
            if let Some(timeout_secs) = store.timeout_secs {
                self.store.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(name) = agent.name {
                self.agent.name = name;
            }
            if let Some(system_prompt) = agent.system_prompt {
                self.agent.system_prompt = system_prompt;
            }
            if let Some(cost_tracking) = agent.cost_tracking {
                self.agent.cost_tracking = cost_tracking;
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
        if let Some(value) = read_env("SHOPKEEP_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("SHOPKEEP_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SHOPKEEP_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SHOPKEEP_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SHOPKEEP_STORE_BASE_URL") {
            self.store.base_url = Some(value);
        }
        if let Some(value) = read_env("SHOPKEEP_STORE_API_KEY") {
            self.store.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SHOPKEEP_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_u64("SHOPKEEP_STORE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SHOPKEEP_AGENT_NAME") {
            self.agent.name = value;
        }
        if let Some(value) = read_env("SHOPKEEP_AGENT_SYSTEM_PROMPT") {
            self.agent.system_prompt = value;
        }
        let cost_tracking =
            read_env("SHOPKEEP_AGENT_COST_TRACKING").or_else(|| read_env("SHOPKEEP_COST_TRACKING"));
        if let Some(value) = cost_tracking {
            self.agent.cost_tracking = parse_bool("SHOPKEEP_AGENT_COST_TRACKING", &value)?;
        }

        let log_level =
            read_env("SHOPKEEP_LOGGING_LEVEL").or_else(|| read_env("SHOPKEEP_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SHOPKEEP_LOGGING_FORMAT").or_else(|| read_env("SHOPKEEP_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = llm_base_url;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(store_base_url) = overrides.store_base_url {
            self.store.base_url = Some(store_base_url);
        }
        if let Some(cost_tracking) = overrides.cost_tracking {
            self.agent.cost_tracking = cost_tracking;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_store(&self.store)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("shopkeep.toml"), PathBuf::from("config/shopkeep.toml")]
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

fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if !is_http_url(&llm.base_url) {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https:// (e.g. http://localhost:11434)"
                .to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model is required. Pull one first, e.g. `ollama pull llama3.1`".to_string(),
        ));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &store.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "store.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if store.timeout_secs == 0 || store.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "store.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.name.trim().is_empty() {
        return Err(ConfigError::Validation("agent.name must not be empty".to_string()));
    }

    if agent.system_prompt.trim().is_empty() {
        return Err(ConfigError::Validation("agent.system_prompt must not be empty".to_string()));
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

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    store: Option<StorePatch>,
    agent: Option<AgentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    name: Option<String>,
    system_prompt: Option<String>,
    cost_tracking: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
