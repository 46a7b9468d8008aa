use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use shopkeep_cli::commands::{config, products};
use shopkeep_core::config::{ConfigOverrides, LoadOptions};
use shopkeep_core::StoreClient;

#[test]
fn config_attributes_values_to_env_and_defaults() {
    with_env(&[("SHOPKEEP_LLM_MODEL", "qwen2.5")], || {
        let output = config::run(LoadOptions::default());

        assert!(output.starts_with("effective config"), "unexpected output: {output}");
        assert!(output.contains("- llm.model = qwen2.5 (source: env (SHOPKEEP_LLM_MODEL))"));
        assert!(output.contains("- llm.base_url = http://localhost:11434 (source: default)"));
        assert!(output.contains("- store.base_url = <unset> (built-in mock store)"));
    });
}

#[test]
fn config_redacts_store_api_key() {
    with_env(&[("SHOPKEEP_STORE_API_KEY", "sk-very-secret-value")], || {
        let output = config::run(LoadOptions::default());

        assert!(output.contains("- store.api_key = sk-***"));
        assert!(!output.contains("very-secret-value"));
    });
}

#[test]
fn config_reports_env_aliases() {
    with_env(&[("SHOPKEEP_LOG_LEVEL", "debug"), ("SHOPKEEP_COST_TRACKING", "true")], || {
        let output = config::run(LoadOptions::default());

        assert!(output.contains("- logging.level = debug (source: env (SHOPKEEP_LOG_LEVEL))"));
        assert!(
            output.contains("- agent.cost_tracking = true (source: env (SHOPKEEP_COST_TRACKING))")
        );
    });
}

#[test]
fn config_ignores_blank_env_values_when_attributing() {
    with_env(&[("SHOPKEEP_LLM_MODEL", "  "), ("SHOPKEEP_LOG_LEVEL", "")], || {
        let output = config::run(LoadOptions::default());

        assert!(output.contains("- llm.model = llama3.1 (source: default)"), "output: {output}");
        assert!(output.contains("- logging.level = info (source: default)"), "output: {output}");
    });
}

#[test]
fn config_prefers_flag_attribution_over_env() {
    with_env(&[("SHOPKEEP_LLM_MODEL", "qwen2.5")], || {
        let options = LoadOptions {
            overrides: ConfigOverrides {
                llm_model: Some("mistral".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        };

        let output = config::run(options);

        assert!(output.contains("- llm.model = mistral (source: cli flag)"));
    });
}

#[test]
fn config_attributes_values_to_explicit_file() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shopkeep.toml");
        fs::write(&path, "[store]\nbase_url = \"http://localhost:3000\"\ntimeout_secs = 5\n")
            .expect("write config");

        let output = config::run(LoadOptions {
            config_path: Some(path.clone()),
            require_file: true,
            ..LoadOptions::default()
        });

        let expected = format!(
            "- store.base_url = http://localhost:3000 (source: file ({}))",
            path.display()
        );
        assert!(output.contains(&expected), "unexpected output: {output}");
        assert!(output.contains("- store.timeout_secs = 5 (source: file"));
        assert!(output.contains("- llm.model = llama3.1 (source: default)"));
    });
}

#[test]
fn config_reports_validation_failures() {
    with_env(&[("SHOPKEEP_LLM_BASE_URL", "localhost:11434")], || {
        let output = config::run(LoadOptions::default());

        assert!(output.starts_with("config validation failed:"), "unexpected output: {output}");
    });
}

#[tokio::test]
async fn products_lists_the_mock_catalog() {
    let result = products::list(&StoreClient::default(), None, false).await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.output.lines().count(), 5);
    assert!(result.output.lines().next().is_some_and(|line| line.contains("Wireless Mouse")));
}

#[tokio::test]
async fn products_search_emits_json() {
    let result = products::list(&StoreClient::default(), Some("sports"), true).await;

    assert_eq!(result.exit_code, 0);
    let payload: Value = serde_json::from_str(&result.output).expect("json output");
    let names = payload
        .as_array()
        .expect("array")
        .iter()
        .map(|product| product["name"].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Running Shoes".to_string(), "Yoga Mat".to_string()]);
}

#[tokio::test]
async fn products_search_without_matches_says_so() {
    let result = products::list(&StoreClient::default(), Some("telescope"), false).await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.output, "no products found");
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SHOPKEEP_LLM_BASE_URL",
        "SHOPKEEP_LLM_MODEL",
        "SHOPKEEP_LLM_TIMEOUT_SECS",
        "SHOPKEEP_STORE_BASE_URL",
        "SHOPKEEP_STORE_API_KEY",
        "SHOPKEEP_STORE_TIMEOUT_SECS",
        "SHOPKEEP_AGENT_NAME",
        "SHOPKEEP_AGENT_SYSTEM_PROMPT",
        "SHOPKEEP_AGENT_COST_TRACKING",
        "SHOPKEEP_COST_TRACKING",
        "SHOPKEEP_LOGGING_LEVEL",
        "SHOPKEEP_LOGGING_FORMAT",
        "SHOPKEEP_LOG_LEVEL",
        "SHOPKEEP_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
