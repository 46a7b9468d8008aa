use serde::Serialize;
use shopkeep_agent::AgentRuntime;
use shopkeep_core::config::AppConfig;
use tracing::error;

use super::{build_agent, CommandResult};

#[derive(Debug, Serialize)]
struct AskReport<'a> {
    reply: &'a str,
    iterations: usize,
    tool_calls: usize,
    input_tokens: u64,
    output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    cost: Option<String>,
    iteration_limit_reached: bool,
}

pub async fn run(config: &AppConfig, message: &str, json: bool) -> CommandResult {
    match build_agent(config) {
        Ok(mut agent) => ask(&mut agent, message, json).await,
        Err(error) => CommandResult::agent_failure("ask", &error),
    }
}

/// Runs one turn against `agent` and renders the reply.
pub async fn ask(agent: &mut AgentRuntime, message: &str, json: bool) -> CommandResult {
    let reply = match agent.chat(message).await {
        Ok(reply) => reply,
        Err(error) => {
            error!(event_name = "cli.ask.failed", error = %error, "single-shot turn failed");
            return CommandResult::agent_failure("ask", &error);
        }
    };

    if !json {
        return CommandResult::text(reply);
    }

    let turn = agent.last_turn().cloned().unwrap_or_default();
    let report = AskReport {
        reply: &reply,
        iterations: turn.iterations,
        tool_calls: turn.tool_calls,
        input_tokens: turn.usage.input_tokens,
        output_tokens: turn.usage.output_tokens,
        cost: agent.cost_tracking().then(|| agent.total_cost().normalize().to_string()),
        iteration_limit_reached: turn.iteration_limit_reached,
    };
    match serde_json::to_string(&report) {
        Ok(output) => CommandResult::text(output),
        Err(error) => CommandResult::failure("ask", "serialization", error.to_string(), 1),
    }
}
