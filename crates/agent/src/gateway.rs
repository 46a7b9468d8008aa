use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::conversation::{Message, ToolCallRequest};
use crate::cost::CostEstimator;
use crate::llm::{BackendError, ChatBackend, ChatRequest, ChatResponse};
use crate::telemetry::{attributes, Operation, SpanHandle, SpanId, SpanStatus, Telemetry};
use crate::tools::ToolRegistry;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// What the model asked for on one exchange.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelReply {
    Text(String),
    ToolCalls { calls: Vec<ToolCallRequest>, text: Option<String> },
}

impl ModelReply {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::ToolCalls { text, .. } => text.as_deref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelExchange {
    pub reply: ModelReply,
    pub usage: Usage,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("model request to `{model}` failed")]
    Backend {
        model: String,
        #[source]
        source: BackendError,
    },
}

/// Sends the full history plus the tool registry to the chat backend, one exchange per call.
#[derive(Clone)]
pub struct ModelGateway {
    backend: Arc<dyn ChatBackend>,
    model: String,
    registry: &'static ToolRegistry,
    cost: CostEstimator,
    telemetry: Telemetry,
}

impl ModelGateway {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        model: impl Into<String>,
        cost: CostEstimator,
        telemetry: Telemetry,
    ) -> Self {
        Self { backend, model: model.into(), registry: ToolRegistry::standard(), cost, telemetry }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn cost_estimator(&self) -> CostEstimator {
        self.cost
    }

    pub async fn request(
        &self,
        history: &[Message],
        parent: Option<SpanId>,
    ) -> Result<ModelExchange, GatewayError> {
        let mut initial = vec![(attributes::MODEL, json!(self.model))];
        match serde_json::to_string(history) {
            Ok(input) => initial.push((attributes::INPUT, json!(input))),
            Err(error) => warn!(
                event_name = "agent.model.input_unrecorded",
                model = %self.model,
                error = %error,
                "history could not be serialized; request span has no input attribute"
            ),
        }
        let mut span = self.telemetry.start_operation(Operation::Request, parent, initial);
        debug!(
            event_name = "agent.model.request",
            model = %self.model,
            message_count = history.len(),
            "requesting model reply"
        );

        let request = ChatRequest {
            model: &self.model,
            messages: history,
            tools: self.registry.descriptors(),
        };

        match self.backend.chat(request).await {
            Ok(response) => {
                let exchange = resolve(response);
                if let Some(text) = exchange.reply.text().filter(|text| !text.is_empty()) {
                    span.set_attribute(attributes::RESPONSE_TEXT, text);
                }
                if let ModelReply::ToolCalls { calls, .. } = &exchange.reply {
                    let names = calls.iter().map(|call| call.name.as_str()).collect::<Vec<_>>();
                    span.set_attribute(attributes::OUTPUT, json!(names));
                }
                self.record_usage(&mut span, exchange.usage);
                span.finish(SpanStatus::Ok);
                Ok(exchange)
            }
            Err(source) => {
                let error = GatewayError::Backend { model: self.model.clone(), source };
                span.record_error(
                    &error,
                    json!({
                        "model": self.model,
                        "message_count": history.len(),
                        "tools_offered": self.registry.descriptors().len(),
                    }),
                );
                span.finish(SpanStatus::Error);
                Err(error)
            }
        }
    }

    fn record_usage(&self, span: &mut SpanHandle, usage: Usage) {
        if usage.input_tokens > 0 {
            span.set_attribute(attributes::INPUT_TOKENS, usage.input_tokens);
        }
        if usage.output_tokens > 0 {
            span.set_attribute(attributes::OUTPUT_TOKENS, usage.output_tokens);
        }
        if usage.total() > 0 {
            span.set_attribute(attributes::TOTAL_TOKENS, usage.total());
            if self.cost.is_enabled() {
                let cost = self.cost.cost(usage.input_tokens, usage.output_tokens);
                span.set_attribute(attributes::COST, Value::String(cost.normalize().to_string()));
            }
        }
    }
}

fn resolve(response: ChatResponse) -> ModelExchange {
    let usage = Usage {
        input_tokens: response.prompt_eval_count.unwrap_or(0),
        output_tokens: response.eval_count.unwrap_or(0),
    };
    let content = response.message.content;
    let calls = response
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCallRequest {
            id: call
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect::<Vec<_>>();

    let reply = if calls.is_empty() {
        ModelReply::Text(content)
    } else {
        let text = Some(content).filter(|text| !text.trim().is_empty());
        ModelReply::ToolCalls { calls, text }
    };

    ModelExchange { reply, usage }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{GatewayError, ModelGateway, ModelReply, Usage};
    use crate::conversation::Message;
    use crate::cost::CostEstimator;
    use crate::telemetry::{attributes, MemorySink, Operation, SpanStatus, Telemetry};
    use crate::testing::{text_response, tool_call_response, ScriptedChatBackend};

    fn gateway(
        backend: Arc<ScriptedChatBackend>,
        cost: CostEstimator,
    ) -> (Arc<MemorySink>, ModelGateway) {
        let sink = Arc::new(MemorySink::default());
        let gateway =
            ModelGateway::new(backend, "llama3.1", cost, Telemetry::new(sink.clone()));
        (sink, gateway)
    }

    #[tokio::test]
    async fn text_reply_records_usage_and_response() {
        let backend = Arc::new(ScriptedChatBackend::new(vec![Ok(text_response("Hi!", 1200, 300))]));
        let (sink, gateway) = gateway(backend.clone(), CostEstimator::enabled());

        let exchange = gateway
            .request(&[Message::system("sys"), Message::user("hello")], None)
            .await
            .expect("exchange");

        assert_eq!(exchange.reply, ModelReply::Text("Hi!".to_string()));
        assert_eq!(exchange.usage, Usage { input_tokens: 1200, output_tokens: 300 });

        let span = &sink.spans_for(Operation::Request)[0];
        assert_eq!(span.status, SpanStatus::Ok);
        assert_eq!(span.attribute(attributes::MODEL), Some(&json!("llama3.1")));
        assert_eq!(span.attribute(attributes::RESPONSE_TEXT), Some(&json!("Hi!")));
        assert_eq!(span.attribute(attributes::TOTAL_TOKENS), Some(&json!(1500)));
        assert_eq!(span.attribute(attributes::COST), Some(&json!("0.00036")));
    }

    #[tokio::test]
    async fn request_span_records_the_serialized_history() {
        let backend = Arc::new(ScriptedChatBackend::new(vec![Ok(text_response("Hi!", 1, 1))]));
        let (sink, gateway) = gateway(backend, CostEstimator::disabled());
        let history = [Message::system("sys"), Message::user("hello")];

        gateway.request(&history, None).await.expect("exchange");

        let span = &sink.spans_for(Operation::Request)[0];
        let input = span.attribute(attributes::INPUT).and_then(|value| value.as_str());
        let recorded: Vec<Message> = serde_json::from_str(input.expect("input attribute"))
            .expect("input is the serialized history");
        assert_eq!(recorded, history.to_vec());
    }

    #[tokio::test]
    async fn zero_token_counts_are_omitted() {
        let backend = Arc::new(ScriptedChatBackend::new(vec![Ok(text_response("ok", 0, 0))]));
        let (sink, gateway) = gateway(backend, CostEstimator::enabled());

        gateway.request(&[Message::system("sys")], None).await.expect("exchange");

        let span = &sink.spans_for(Operation::Request)[0];
        assert!(span.attribute(attributes::INPUT_TOKENS).is_none());
        assert!(span.attribute(attributes::OUTPUT_TOKENS).is_none());
        assert!(span.attribute(attributes::TOTAL_TOKENS).is_none());
        assert!(span.attribute(attributes::COST).is_none());
    }

    #[tokio::test]
    async fn tool_calls_without_ids_receive_generated_ids() {
        let mut response = tool_call_response(&[("get_products", json!({}))], 10, 5);
        response.message.tool_calls.as_mut().expect("calls")[0].id = None;
        let backend = Arc::new(ScriptedChatBackend::new(vec![Ok(response)]));
        let (_sink, gateway) = gateway(backend, CostEstimator::disabled());

        let exchange = gateway.request(&[Message::system("sys")], None).await.expect("exchange");

        match exchange.reply {
            ModelReply::ToolCalls { calls, text } => {
                assert_eq!(calls.len(), 1);
                assert!(calls[0].id.starts_with("call_"));
                assert_eq!(text, None);
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_request_offers_the_same_history_and_tools() {
        let backend = Arc::new(ScriptedChatBackend::new(vec![
            Ok(text_response("one", 1, 1)),
            Ok(text_response("two", 1, 1)),
        ]));
        let (_sink, gateway) = gateway(backend.clone(), CostEstimator::disabled());
        let history = vec![Message::system("sys"), Message::user("hi")];

        gateway.request(&history, None).await.expect("first");
        gateway.request(&history, None).await.expect("second");

        let captured = backend.captured();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].messages, history);
        assert_eq!(captured[0].model, "llama3.1");
        assert_eq!(captured[0].tools, captured[1].tools);
        assert_eq!(captured[0].tool_names.len(), 4);
    }

    #[tokio::test]
    async fn backend_failure_is_reported_with_request_context() {
        let backend = Arc::new(ScriptedChatBackend::new(Vec::new()));
        let (sink, gateway) = gateway(backend, CostEstimator::enabled());

        let error = gateway
            .request(&[Message::system("sys"), Message::user("hi")], None)
            .await
            .expect_err("scripted backend is empty");

        assert!(matches!(error, GatewayError::Backend { ref model, .. } if model == "llama3.1"));
        let reports = sink.errors();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].context["message_count"], 2);
        assert_eq!(reports[0].context["tools_offered"], 4);
        assert_eq!(sink.spans_for(Operation::Request)[0].status, SpanStatus::Error);
    }
}
