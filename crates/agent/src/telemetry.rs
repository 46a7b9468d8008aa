//! Span-based telemetry for the agent.
//!
//! Every instrumented step acquires a [`SpanHandle`] from [`Telemetry`] and
//! finishes it with a status. A handle that is dropped without being finished
//! (early return, `?`, panic unwind) is recorded with [`SpanStatus::Error`], so
//! every started span reaches the sink exactly once.

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

/// Attribute keys shared by all spans.
pub mod attributes {
    pub const AGENT_NAME: &str = "gen_ai.agent.name";
    pub const MODEL: &str = "gen_ai.request.model";
    pub const TOOL_NAME: &str = "gen_ai.tool.name";
    pub const INPUT: &str = "input.value";
    pub const OUTPUT: &str = "output.value";
    pub const RESPONSE_TEXT: &str = "gen_ai.response.text";
    pub const INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";
    pub const OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";
    pub const TOTAL_TOKENS: &str = "gen_ai.usage.total_tokens";
    pub const COST: &str = "gen_ai.usage.cost";
    pub const ITERATIONS: &str = "gen_ai.agent.iterations";
    pub const ITERATION_LIMIT_REACHED: &str = "gen_ai.agent.iteration_limit_reached";
    pub const ERROR_MESSAGE: &str = "error.message";
    pub const ERROR_CHAIN: &str = "error.chain";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    InvokeAgent,
    Request,
    ExecuteTool,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvokeAgent => "invoke_agent",
            Self::Request => "request",
            Self::ExecuteTool => "execute_tool",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Ok,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SpanId(pub u64);

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpanRecord {
    pub id: SpanId,
    pub parent: Option<SpanId>,
    pub operation: Operation,
    pub attributes: BTreeMap<&'static str, Value>,
    pub status: SpanStatus,
    pub duration_ms: u64,
}

impl SpanRecord {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Failure context reported alongside an errored span.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorReport {
    pub span: SpanId,
    pub operation: Operation,
    pub message: String,
    pub chain: Vec<String>,
    pub context: Value,
}

pub trait SpanSink: Send + Sync {
    fn record_span(&self, span: SpanRecord);
    fn report_error(&self, report: ErrorReport);
}

#[derive(Clone)]
pub struct Telemetry {
    sink: Arc<dyn SpanSink>,
    next_id: Arc<AtomicU64>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl Telemetry {
    pub fn new(sink: Arc<dyn SpanSink>) -> Self {
        Self { sink, next_id: Arc::new(AtomicU64::new(1)) }
    }

    pub fn start_operation(
        &self,
        operation: Operation,
        parent: Option<SpanId>,
        initial: Vec<(&'static str, Value)>,
    ) -> SpanHandle {
        let id = SpanId(self.next_id.fetch_add(1, Ordering::Relaxed));
        SpanHandle {
            sink: Arc::clone(&self.sink),
            id,
            parent,
            operation,
            attributes: initial.into_iter().collect(),
            started: Instant::now(),
            finished: false,
        }
    }
}

#[must_use = "a span handle records an error status when dropped without `finish`"]
pub struct SpanHandle {
    sink: Arc<dyn SpanSink>,
    id: SpanId,
    parent: Option<SpanId>,
    operation: Operation,
    attributes: BTreeMap<&'static str, Value>,
    started: Instant,
    finished: bool,
}

impl SpanHandle {
    pub fn id(&self) -> SpanId {
        self.id
    }

    pub fn set_attribute(&mut self, key: &'static str, value: impl Into<Value>) {
        self.attributes.insert(key, value.into());
    }

    /// Attaches the error to the span and reports it with `context` to the sink.
    pub fn record_error(&mut self, error: &dyn Error, context: Value) {
        let message = error.to_string();
        let chain = error_chain(error);

        self.set_attribute(attributes::ERROR_MESSAGE, message.clone());
        if !chain.is_empty() {
            self.set_attribute(attributes::ERROR_CHAIN, chain.clone());
        }

        self.sink.report_error(ErrorReport {
            span: self.id,
            operation: self.operation,
            message,
            chain,
            context,
        });
    }

    pub fn finish(mut self, status: SpanStatus) {
        self.complete(status);
    }

    fn complete(&mut self, status: SpanStatus) {
        if self.finished {
            return;
        }
        self.finished = true;

        self.sink.record_span(SpanRecord {
            id: self.id,
            parent: self.parent,
            operation: self.operation,
            attributes: std::mem::take(&mut self.attributes),
            status,
            duration_ms: self.started.elapsed().as_millis() as u64,
        });
    }
}

impl Drop for SpanHandle {
    fn drop(&mut self) {
        self.complete(SpanStatus::Error);
    }
}

fn error_chain(error: &dyn Error) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = error.source();
    while let Some(cause) = current {
        chain.push(cause.to_string());
        current = cause.source();
    }
    chain
}

/// Renders spans and error reports as `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl SpanSink for TracingSink {
    fn record_span(&self, span: SpanRecord) {
        let attributes = serde_json::to_string(&span.attributes).unwrap_or_default();
        let parent_id = span.parent.map(|parent| parent.0);
        match span.status {
            SpanStatus::Ok => info!(
                event_name = "telemetry.span.finished",
                operation = span.operation.as_str(),
                span_id = span.id.0,
                parent_id,
                status = "ok",
                duration_ms = span.duration_ms,
                attributes = %attributes,
                "span finished"
            ),
            SpanStatus::Error => warn!(
                event_name = "telemetry.span.finished",
                operation = span.operation.as_str(),
                span_id = span.id.0,
                parent_id,
                status = "error",
                duration_ms = span.duration_ms,
                attributes = %attributes,
                "span finished with error"
            ),
        }
    }

    fn report_error(&self, report: ErrorReport) {
        error!(
            event_name = "telemetry.error.reported",
            operation = report.operation.as_str(),
            span_id = report.span.0,
            error = %report.message,
            chain = ?report.chain,
            context = %report.context,
            "operation failed"
        );
    }
}

/// Buffers spans in memory for inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    spans: Mutex<Vec<SpanRecord>>,
    errors: Mutex<Vec<ErrorReport>>,
}

impl MemorySink {
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn spans_for(&self, operation: Operation) -> Vec<SpanRecord> {
        self.spans().into_iter().filter(|span| span.operation == operation).collect()
    }

    pub fn errors(&self) -> Vec<ErrorReport> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SpanSink for MemorySink {
    fn record_span(&self, span: SpanRecord) {
        self.spans.lock().unwrap_or_else(PoisonError::into_inner).push(span);
    }

    fn report_error(&self, report: ErrorReport) {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).push(report);
    }
}
