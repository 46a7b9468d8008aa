//! Scripted doubles shared by the unit tests in this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use shopkeep_core::{
    CommerceBackend, MockCommerceBackend, Order, OrderRequest, Product, ProductId, StoreError,
};

use crate::conversation::{Message, ToolArguments};
use crate::llm::{
    BackendError, ChatBackend, ChatRequest, ChatResponse, RawFunction, RawToolCall,
    ResponseMessage,
};

#[derive(Clone, Debug, PartialEq)]
pub struct CapturedRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: String,
    pub tool_names: Vec<&'static str>,
}

/// Replays queued responses in order; `repeat` answers once the queue is empty.
#[derive(Default)]
pub struct ScriptedChatBackend {
    script: Mutex<VecDeque<Result<ChatResponse, BackendError>>>,
    repeat: Option<ChatResponse>,
    captured: Mutex<Vec<CapturedRequest>>,
}

impl ScriptedChatBackend {
    pub fn new(script: Vec<Result<ChatResponse, BackendError>>) -> Self {
        Self { script: Mutex::new(script.into()), ..Self::default() }
    }

    pub fn repeating(response: ChatResponse) -> Self {
        Self { repeat: Some(response), ..Self::default() }
    }

    pub fn captured(&self) -> Vec<CapturedRequest> {
        self.captured.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedChatBackend {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse, BackendError> {
        self.captured.lock().unwrap_or_else(PoisonError::into_inner).push(CapturedRequest {
            model: request.model.to_string(),
            messages: request.messages.to_vec(),
            tools: serde_json::to_string(request.tools).unwrap_or_default(),
            tool_names: request.tools.iter().map(|tool| tool.name).collect(),
        });

        let next = self.script.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        match (next, &self.repeat) {
            (Some(response), _) => response,
            (None, Some(response)) => Ok(response.clone()),
            (None, None) => Err(BackendError::Transport("connection refused".to_string())),
        }
    }
}

pub fn text_response(content: &str, input_tokens: u64, output_tokens: u64) -> ChatResponse {
    ChatResponse {
        message: ResponseMessage { content: content.to_string(), tool_calls: None },
        prompt_eval_count: Some(input_tokens),
        eval_count: Some(output_tokens),
    }
}

/// Tool calls get ids `call-1`, `call-2`, ... in the order given.
pub fn tool_call_response(
    calls: &[(&str, Value)],
    input_tokens: u64,
    output_tokens: u64,
) -> ChatResponse {
    let tool_calls = calls
        .iter()
        .enumerate()
        .map(|(index, (name, arguments))| RawToolCall {
            id: Some(format!("call-{}", index + 1)),
            function: RawFunction {
                name: name.to_string(),
                arguments: ToolArguments::Structured(arguments.clone()),
            },
        })
        .collect();

    ChatResponse {
        message: ResponseMessage { content: String::new(), tool_calls: Some(tool_calls) },
        prompt_eval_count: Some(input_tokens),
        eval_count: Some(output_tokens),
    }
}

/// Mock store that counts every backend call and can be told to fail.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MockCommerceBackend,
    pub calls: AtomicUsize,
    pub fail_listing: bool,
    pub fail_search: bool,
    pub fail_orders: bool,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn unavailable(endpoint: &str) -> StoreError {
    StoreError::Transport { endpoint: endpoint.to_string(), message: "connection refused".into() }
}

#[async_trait]
impl CommerceBackend for CountingStore {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        self.record();
        if self.fail_listing {
            return Err(unavailable("/products"));
        }
        self.inner.list_products().await
    }

    async fn search_products(&self, query: &str) -> Result<Vec<Product>, StoreError> {
        self.record();
        if self.fail_search {
            return Err(unavailable("/products/search"));
        }
        self.inner.search_products(query).await
    }

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.record();
        self.inner.product_by_id(id).await
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order, StoreError> {
        self.record();
        if self.fail_orders {
            return Err(unavailable("/orders"));
        }
        self.inner.create_order(request).await
    }
}
