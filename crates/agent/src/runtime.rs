use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use shopkeep_core::config::{AgentConfig, AppConfig};
use shopkeep_core::StoreClient;
use thiserror::Error;
use tracing::{info, warn};

use crate::conversation::{Conversation, Message, ToolCallRequest};
use crate::cost::CostEstimator;
use crate::executor::{ToolError, ToolExecutor};
use crate::gateway::{GatewayError, ModelGateway, ModelReply, Usage};
use crate::llm::OllamaBackend;
use crate::telemetry::{attributes, Operation, SpanId, SpanStatus, Telemetry};

/// Upper bound on model exchanges within one `chat` call.
pub const MAX_ITERATIONS: usize = 10;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] GatewayError),
    #[error(transparent)]
    Tool(ToolError),
    #[error("agent could not be configured: {0}")]
    Configuration(String),
}

impl AgentError {
    /// Short text suitable for showing to the shopper instead of the raw error.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Model(_) => "The language model is unavailable right now. Please try again.",
            Self::Tool(_) => "The assistant asked for an action it does not support.",
            Self::Configuration(_) => "The assistant is not configured correctly.",
        }
    }
}

/// Outcome of the most recent successful turn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnSummary {
    pub usage: Usage,
    pub cost: Decimal,
    pub iterations: usize,
    pub tool_calls: usize,
    pub iteration_limit_reached: bool,
}

#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub name: String,
    pub system_prompt: String,
}

impl From<&AgentConfig> for AgentSettings {
    fn from(config: &AgentConfig) -> Self {
        Self { name: config.name.clone(), system_prompt: config.system_prompt.clone() }
    }
}

/// Drives the request/tool loop over a conversation it owns.
pub struct AgentRuntime {
    name: String,
    gateway: ModelGateway,
    executor: ToolExecutor,
    telemetry: Telemetry,
    conversation: Conversation,
    last_turn: Option<TurnSummary>,
}

impl AgentRuntime {
    pub fn new(
        settings: AgentSettings,
        gateway: ModelGateway,
        executor: ToolExecutor,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            name: settings.name,
            gateway,
            executor,
            telemetry,
            conversation: Conversation::new(settings.system_prompt),
            last_turn: None,
        }
    }

    /// Wires the Ollama backend and the configured store into a runtime.
    pub fn from_config(config: &AppConfig, telemetry: Telemetry) -> Result<Self, AgentError> {
        let backend = OllamaBackend::from_config(&config.llm)
            .map_err(|error| AgentError::Configuration(error.to_string()))?;
        let store = StoreClient::from_config(&config.store)
            .map_err(|error| AgentError::Configuration(error.to_string()))?;
        let gateway = ModelGateway::new(
            Arc::new(backend),
            config.llm.model.clone(),
            CostEstimator::new(config.agent.cost_tracking),
            telemetry.clone(),
        );
        let executor = ToolExecutor::new(store, telemetry.clone());

        Ok(Self::new(AgentSettings::from(&config.agent), gateway, executor, telemetry))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        self.gateway.model()
    }

    pub fn history(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn total_cost(&self) -> Decimal {
        self.conversation.total_cost()
    }

    pub fn cost_tracking(&self) -> bool {
        self.gateway.cost_estimator().is_enabled()
    }

    pub fn last_turn(&self) -> Option<&TurnSummary> {
        self.last_turn.as_ref()
    }

    /// Drops everything but the system message and zeroes the running cost.
    pub fn reset(&mut self) {
        self.conversation.reset();
        self.last_turn = None;
        info!(event_name = "agent.conversation.reset", agent = %self.name, "conversation reset");
    }

    /// Runs one user turn to completion and returns the assistant's reply.
    ///
    /// Model failures and unregistered tool names abort the turn; messages
    /// appended before the failure stay in the history. Other tool failures are
    /// handed back to the model as failed tool results.
    pub async fn chat(&mut self, user_text: &str) -> Result<String, AgentError> {
        let mut span = self.telemetry.start_operation(
            Operation::InvokeAgent,
            None,
            vec![
                (attributes::AGENT_NAME, json!(self.name)),
                (attributes::MODEL, json!(self.gateway.model())),
                (attributes::INPUT, json!(user_text)),
            ],
        );
        info!(
            event_name = "agent.chat.started",
            agent = %self.name,
            history_len = self.conversation.len(),
            "chat turn started"
        );

        let mut turn = TurnSummary::default();
        match self.run_turn(user_text, span.id(), &mut turn).await {
            Ok(response) => {
                let estimator = self.gateway.cost_estimator();
                turn.cost = estimator.cost(turn.usage.input_tokens, turn.usage.output_tokens);
                self.conversation.add_cost(turn.cost);

                span.set_attribute(attributes::RESPONSE_TEXT, response.clone());
                span.set_attribute(attributes::ITERATIONS, turn.iterations);
                if turn.usage.input_tokens > 0 {
                    span.set_attribute(attributes::INPUT_TOKENS, turn.usage.input_tokens);
                }
                if turn.usage.output_tokens > 0 {
                    span.set_attribute(attributes::OUTPUT_TOKENS, turn.usage.output_tokens);
                }
                if turn.usage.total() > 0 {
                    span.set_attribute(attributes::TOTAL_TOKENS, turn.usage.total());
                }
                if self.cost_tracking() {
                    span.set_attribute(attributes::COST, turn.cost.normalize().to_string());
                }
                if turn.iteration_limit_reached {
                    span.set_attribute(attributes::ITERATION_LIMIT_REACHED, true);
                }
                span.finish(SpanStatus::Ok);

                info!(
                    event_name = "agent.chat.completed",
                    agent = %self.name,
                    iterations = turn.iterations,
                    tool_calls = turn.tool_calls,
                    total_tokens = turn.usage.total(),
                    "chat turn completed"
                );
                self.last_turn = Some(turn);
                Ok(response)
            }
            Err(error) => {
                span.record_error(
                    &error,
                    json!({
                        "agent": self.name,
                        "model": self.gateway.model(),
                        "user_text": user_text,
                        "history_len": self.conversation.len(),
                        "iteration": turn.iterations,
                    }),
                );
                span.finish(SpanStatus::Error);
                self.last_turn = None;
                Err(error)
            }
        }
    }

    async fn run_turn(
        &mut self,
        user_text: &str,
        parent: SpanId,
        turn: &mut TurnSummary,
    ) -> Result<String, AgentError> {
        self.conversation.push_user(user_text);
        let mut last_text = String::new();

        while turn.iterations < MAX_ITERATIONS {
            turn.iterations += 1;
            let exchange = self.gateway.request(self.conversation.messages(), Some(parent)).await?;
            turn.usage.add(exchange.usage);

            match exchange.reply {
                ModelReply::Text(text) => {
                    self.conversation.push_assistant(text.clone());
                    return Ok(text);
                }
                ModelReply::ToolCalls { calls, text } => {
                    let content = text.unwrap_or_default();
                    if !content.is_empty() {
                        last_text.clone_from(&content);
                    }
                    self.conversation.push_tool_calls(content, calls.clone());
                    for call in &calls {
                        self.dispatch(call, parent, turn).await?;
                    }
                }
            }
        }

        turn.iteration_limit_reached = true;
        warn!(
            event_name = "agent.chat.iteration_limit",
            agent = %self.name,
            max_iterations = MAX_ITERATIONS,
            "model kept requesting tools; returning the last text it produced"
        );
        Ok(last_text)
    }

    async fn dispatch(
        &mut self,
        call: &ToolCallRequest,
        parent: SpanId,
        turn: &mut TurnSummary,
    ) -> Result<(), AgentError> {
        turn.tool_calls += 1;
        let outcome = self.executor.execute(&call.name, &call.arguments, Some(parent)).await;
        let content = match outcome {
            Ok(result) => result.to_string(),
            Err(error @ ToolError::UnknownTool(_)) => return Err(AgentError::Tool(error)),
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    tool = %call.name,
                    call_id = %call.id,
                    error = %error,
                    "tool failed; reporting failure to the model"
                );
                json!({ "error": error.to_string(), "tool": error.tool(), "status": "failed" })
                    .to_string()
            }
        };

        self.conversation.push_tool_result(&call.id, content);
        Ok(())
    }
}
