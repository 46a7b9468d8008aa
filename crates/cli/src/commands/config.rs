use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use shopkeep_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
    overridden: bool,
}

pub fn run(options: LoadOptions) -> String {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let overrides = options.overrides.clone();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields = [
        Field {
            key_path: "llm.base_url",
            env_keys: &["SHOPKEEP_LLM_BASE_URL"],
            value: config.llm.base_url.clone(),
            overridden: overrides.llm_base_url.is_some(),
        },
        Field {
            key_path: "llm.model",
            env_keys: &["SHOPKEEP_LLM_MODEL"],
            value: config.llm.model.clone(),
            overridden: overrides.llm_model.is_some(),
        },
        Field {
            key_path: "llm.timeout_secs",
            env_keys: &["SHOPKEEP_LLM_TIMEOUT_SECS"],
            value: config.llm.timeout_secs.to_string(),
            overridden: false,
        },
        Field {
            key_path: "store.base_url",
            env_keys: &["SHOPKEEP_STORE_BASE_URL"],
            value: config
                .store
                .base_url
                .clone()
                .unwrap_or_else(|| "<unset> (built-in mock store)".to_string()),
            overridden: overrides.store_base_url.is_some(),
        },
        Field {
            key_path: "store.api_key",
            env_keys: &["SHOPKEEP_STORE_API_KEY"],
            value: config
                .store
                .api_key
                .as_ref()
                .map(|key| redact_secret(key.expose_secret()))
                .unwrap_or_else(|| "<unset>".to_string()),
            overridden: false,
        },
        Field {
            key_path: "store.timeout_secs",
            env_keys: &["SHOPKEEP_STORE_TIMEOUT_SECS"],
            value: config.store.timeout_secs.to_string(),
            overridden: false,
        },
        Field {
            key_path: "agent.name",
            env_keys: &["SHOPKEEP_AGENT_NAME"],
            value: config.agent.name.clone(),
            overridden: false,
        },
        Field {
            key_path: "agent.system_prompt",
            env_keys: &["SHOPKEEP_AGENT_SYSTEM_PROMPT"],
            value: format!("<{} chars>", config.agent.system_prompt.chars().count()),
            overridden: false,
        },
        Field {
            key_path: "agent.cost_tracking",
            env_keys: &["SHOPKEEP_AGENT_COST_TRACKING", "SHOPKEEP_COST_TRACKING"],
            value: config.agent.cost_tracking.to_string(),
            overridden: overrides.cost_tracking.is_some(),
        },
        Field {
            key_path: "logging.level",
            env_keys: &["SHOPKEEP_LOGGING_LEVEL", "SHOPKEEP_LOG_LEVEL"],
            value: config.logging.level.clone(),
            overridden: overrides.log_level.is_some(),
        },
        Field {
            key_path: "logging.format",
            env_keys: &["SHOPKEEP_LOGGING_FORMAT", "SHOPKEEP_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format).to_lowercase(),
            overridden: false,
        },
    ];

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    lines.extend(fields.iter().map(|field| {
        let source = if field.overridden {
            "cli flag".to_string()
        } else {
            field_source(
                field.key_path,
                field.env_keys,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            )
        };
        render_line(field.key_path, &field.value, source)
    }));

    lines.join("\n")
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("shopkeep.toml"), PathBuf::from("config/shopkeep.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env_value_present(key)) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

/// Blank values are ignored when the config loads, so they are not a source either.
fn env_value_present(key: &str) -> bool {
    env::var(key).is_ok_and(|value| !value.trim().is_empty())
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_keep_only_their_prefix() {
        assert_eq!(redact_secret("sk-live-abcdef"), "sk-***");
        assert_eq!(redact_secret("opaque"), "<redacted>");
        assert_eq!(redact_secret("  "), "<empty>");
    }

    #[test]
    fn dotted_paths_resolve_in_toml_documents() {
        let doc = "[llm]\nmodel = \"qwen2.5\"\n".parse::<Value>().expect("toml");

        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.base_url"));
        assert!(!contains_path(&doc, "store.base_url"));
    }
}
