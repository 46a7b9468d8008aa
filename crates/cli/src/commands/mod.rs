pub mod ask;
pub mod chat;
pub mod config;
pub mod products;

use serde::Serialize;
use shopkeep_agent::{AgentError, AgentRuntime, Telemetry};
use shopkeep_core::config::AppConfig;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: String,
    message: String,
}

impl CommandResult {
    pub fn text(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: error_class.to_string(),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn agent_failure(command: &str, error: &AgentError) -> Self {
        let (error_class, exit_code) = match error {
            AgentError::Model(_) => ("model_unavailable", 3),
            AgentError::Tool(_) => ("unknown_tool", 3),
            AgentError::Configuration(_) => ("config_validation", 2),
        };
        Self::failure(command, error_class, error.user_message(), exit_code)
    }
}

pub(crate) fn build_agent(config: &AppConfig) -> Result<AgentRuntime, AgentError> {
    AgentRuntime::from_config(config, Telemetry::default())
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
