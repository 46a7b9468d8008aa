use serde::Serialize;
use serde_json::{json, Value};
use shopkeep_core::{OrderItem, ProductId, StoreClient, StoreError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::conversation::ToolArguments;
use crate::telemetry::{attributes, Operation, SpanId, SpanStatus, Telemetry};
use crate::tools::{ToolName, ToolRegistry};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("invalid arguments for `{tool}`: {message}")]
    ArgumentDecodeFailure { tool: String, message: String },
    #[error("`{tool}` failed against the store backend")]
    BackendFailure {
        tool: String,
        #[source]
        source: StoreError,
    },
    #[error("could not encode `{tool}` result: {message}")]
    Encode { tool: String, message: String },
}

impl ToolError {
    pub fn tool(&self) -> &str {
        match self {
            Self::UnknownTool(tool)
            | Self::ArgumentDecodeFailure { tool, .. }
            | Self::BackendFailure { tool, .. }
            | Self::Encode { tool, .. } => tool,
        }
    }
}

/// Maps tool names onto store operations and returns JSON results.
#[derive(Clone)]
pub struct ToolExecutor {
    store: StoreClient,
    telemetry: Telemetry,
}

impl ToolExecutor {
    pub fn new(store: StoreClient, telemetry: Telemetry) -> Self {
        Self { store, telemetry }
    }

    pub async fn execute(
        &self,
        tool_name: &str,
        arguments: &ToolArguments,
        parent: Option<SpanId>,
    ) -> Result<Value, ToolError> {
        let input = match arguments {
            ToolArguments::Encoded(raw) => raw.clone(),
            ToolArguments::Structured(value) => value.to_string(),
        };
        let mut span = self.telemetry.start_operation(
            Operation::ExecuteTool,
            parent,
            vec![(attributes::TOOL_NAME, json!(tool_name)), (attributes::INPUT, json!(input))],
        );

        match self.dispatch(tool_name, arguments).await {
            Ok(result) => {
                span.set_attribute(attributes::OUTPUT, result.to_string());
                span.finish(SpanStatus::Ok);
                Ok(result)
            }
            Err(error) => {
                span.record_error(
                    &error,
                    json!({ "tool": tool_name, "input": input, "reason": error.to_string() }),
                );
                span.finish(SpanStatus::Error);
                Err(error)
            }
        }
    }

    async fn dispatch(
        &self,
        tool_name: &str,
        arguments: &ToolArguments,
    ) -> Result<Value, ToolError> {
        if !ToolRegistry::standard().contains(tool_name) {
            return Err(ToolError::UnknownTool(tool_name.to_string()));
        }
        let tool: ToolName =
            tool_name.parse().map_err(|_| ToolError::UnknownTool(tool_name.to_string()))?;
        let arguments = arguments.normalize().map_err(|error| {
            ToolError::ArgumentDecodeFailure { tool: tool.to_string(), message: error.to_string() }
        })?;
        debug!(event_name = "agent.tool.dispatch", tool = %tool, "executing tool");

        match tool {
            ToolName::GetProducts => encode(tool, &self.store.get_products().await),
            ToolName::SearchProducts => {
                let query = string_field(&arguments, "query").ok_or_else(|| {
                    ToolError::ArgumentDecodeFailure {
                        tool: tool.to_string(),
                        message: "missing string field `query`".to_string(),
                    }
                })?;
                let products = self
                    .store
                    .search_products(&query)
                    .await
                    .map_err(|source| backend(tool, source))?;
                encode(tool, &products)
            }
            ToolName::GetProductDetails => {
                let product_id = ["product_id", "productId", "id"]
                    .into_iter()
                    .find_map(|key| integer_field(&arguments, key))
                    .map(ProductId)
                    .ok_or_else(|| ToolError::ArgumentDecodeFailure {
                        tool: tool.to_string(),
                        message: "missing integer field `product_id`".to_string(),
                    })?;
                let product = self
                    .store
                    .get_product_by_id(product_id)
                    .await
                    .map_err(|source| backend(tool, source))?;
                match product {
                    Some(product) => encode(tool, &product),
                    None => Ok(json!({
                        "found": false,
                        "product_id": product_id,
                        "message": format!("No product with id {product_id}"),
                    })),
                }
            }
            ToolName::PlaceOrder => {
                let items = order_items(tool, &arguments)?;
                let customer_email = ["customer_email", "email"]
                    .into_iter()
                    .find_map(|key| string_field(&arguments, key));
                let order = self.store.create_order(items, customer_email).await;
                encode(tool, &order)
            }
        }
    }
}

fn backend(tool: ToolName, source: StoreError) -> ToolError {
    ToolError::BackendFailure { tool: tool.to_string(), source }
}

fn encode(tool: ToolName, value: &impl Serialize) -> Result<Value, ToolError> {
    serde_json::to_value(value)
        .map_err(|error| ToolError::Encode { tool: tool.to_string(), message: error.to_string() })
}

fn string_field(arguments: &Value, key: &str) -> Option<String> {
    arguments.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Accepts JSON integers, whole-valued floats such as `2.0`, and numeric strings.
fn integer_field(arguments: &Value, key: &str) -> Option<u64> {
    match arguments.get(key)? {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|value| value.fract() == 0.0 && *value >= 0.0)
                .map(|value| value as u64)
        }),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

/// Models sometimes send the item list as a JSON string. One that does not
/// decode is treated as an empty list rather than failing the call; a missing
/// or non-list value is still an argument error.
fn list_field(tool: ToolName, arguments: &Value, key: &str) -> Result<Vec<Value>, ToolError> {
    match arguments.get(key) {
        Some(Value::Array(values)) => Ok(values.clone()),
        Some(Value::String(raw)) => match serde_json::from_str::<Vec<Value>>(raw) {
            Ok(values) => Ok(values),
            Err(error) => {
                warn!(
                    event_name = "agent.tool.list_argument_ignored",
                    tool = %tool,
                    field = key,
                    error = %error,
                    "encoded list argument did not decode; using an empty list"
                );
                Ok(Vec::new())
            }
        },
        Some(_) => Err(ToolError::ArgumentDecodeFailure {
            tool: tool.to_string(),
            message: format!("field `{key}` must be a list"),
        }),
        None => Err(ToolError::ArgumentDecodeFailure {
            tool: tool.to_string(),
            message: format!("missing list field `{key}`"),
        }),
    }
}

fn order_items(tool: ToolName, arguments: &Value) -> Result<Vec<OrderItem>, ToolError> {
    list_field(tool, arguments, "items")?
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let product_id = ["product_id", "productId", "id"]
                .into_iter()
                .find_map(|key| integer_field(item, key));
            let quantity = integer_field(item, "quantity").and_then(|q| u32::try_from(q).ok());
            match (product_id, quantity) {
                (Some(product_id), Some(quantity)) => {
                    Ok(OrderItem { product_id: ProductId(product_id), quantity })
                }
                _ => Err(ToolError::ArgumentDecodeFailure {
                    tool: tool.to_string(),
                    message: format!("item {index} needs integer `product_id` and `quantity`"),
                }),
            }
        })
        .collect()
}
