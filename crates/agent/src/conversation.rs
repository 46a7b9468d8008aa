use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Tool arguments as the model emitted them: either a JSON object or its string encoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArguments {
    Encoded(String),
    Structured(Value),
}

impl Default for ToolArguments {
    fn default() -> Self {
        Self::Structured(Value::Object(Default::default()))
    }
}

impl ToolArguments {
    /// Decodes string-encoded arguments; structured arguments pass through untouched.
    pub fn normalize(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Structured(value) => Ok(value.clone()),
            Self::Encoded(raw) if raw.trim().is_empty() => Ok(Value::Object(Default::default())),
            Self::Encoded(raw) => serde_json::from_str(raw),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: ToolArguments,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), tool_calls: None, tool_call_id: None }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self { tool_calls: Some(calls), ..Self::new(Role::Assistant, content) }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { tool_call_id: Some(call_id.into()), ..Self::new(Role::Tool, content) }
    }
}

/// Ordered message log seeded with one system message, plus the running cost.
#[derive(Clone, Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    total_cost: Decimal,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self { messages: vec![Message::system(system_prompt)], total_cost: Decimal::ZERO }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn system_prompt(&self) -> &str {
        &self.messages[0].content
    }

    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }

    pub(crate) fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub(crate) fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    pub(crate) fn push_tool_calls(
        &mut self,
        content: impl Into<String>,
        calls: Vec<ToolCallRequest>,
    ) {
        self.messages.push(Message::assistant_tool_calls(content, calls));
    }

    pub(crate) fn push_tool_result(&mut self, call_id: &str, content: impl Into<String>) {
        self.messages.push(Message::tool(call_id, content));
    }

    /// Negative amounts are ignored; the running cost never decreases.
    pub(crate) fn add_cost(&mut self, amount: Decimal) {
        if amount > Decimal::ZERO {
            self.total_cost += amount;
        }
    }

    pub(crate) fn reset(&mut self) {
        self.messages.truncate(1);
        self.total_cost = Decimal::ZERO;
    }
}
