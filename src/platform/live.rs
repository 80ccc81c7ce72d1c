//! Live model connection types
//!
//! The live model is reached through the `LiveModel` trait; the transport
//! behind it belongs to the hosting platform.

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::agent::{ModelConfig, RunConfig};
use crate::core::{EngineError, EngineResult};
use crate::tools::FunctionDeclaration;

/// Key of the live request inside a streamed request item
pub const LIVE_REQUEST_KEY: &str = "live_request";

/// Inline media chunk (base64 data)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// One unit of caller input for the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveRequest {
    /// Turn content (`{"role": ..., "parts": [...]}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,

    /// Realtime audio/video chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<Blob>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_start: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_end: Option<Value>,

    /// Caller is done sending
    #[serde(default)]
    pub close: bool,
}

impl LiveRequest {
    pub fn close() -> Self {
        Self {
            close: true,
            ..Default::default()
        }
    }

    /// Parse a `live_request` value
    pub fn from_value(value: Value) -> EngineResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| EngineError::InvalidRequest(format!("invalid live_request: {}", e)))
    }

    /// Extract the live request from a streamed item, if it carries one
    pub fn from_item(item: Value) -> Option<EngineResult<Self>> {
        let Value::Object(mut map) = item else {
            return None;
        };
        match map.remove(LIVE_REQUEST_KEY) {
            None | Some(Value::Null) => None,
            Some(value) => Some(Self::from_value(value)),
        }
    }
}

/// Function call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Result of a function call, sent back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

/// Input sent to the model
#[derive(Debug, Clone, PartialEq)]
pub enum LiveInput {
    /// Caller input
    Request(LiveRequest),
    /// Results of the model's function calls
    ToolResponse(Vec<FunctionResponse>),
}

/// Event received from the model
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// Model output (text, audio or transcript parts)
    Content { content: Value, partial: bool },
    /// Model wants functions called
    ToolCall(Vec<FunctionCall>),
    /// Model finished its turn
    TurnComplete,
    /// Model output was cut off by caller activity
    Interrupted,
}

/// Everything the model needs to start a live session
#[derive(Debug, Clone)]
pub struct LiveConnectRequest {
    pub model: ModelConfig,
    pub instruction: String,
    pub tools: Vec<FunctionDeclaration>,
    pub run_config: RunConfig,
}

/// Stream of model events
pub type ModelEventStream = Pin<Box<dyn Stream<Item = EngineResult<ModelEvent>> + Send>>;

/// An open live session with the model
pub struct LiveConnection {
    /// Input to the model
    pub input: mpsc::Sender<LiveInput>,
    /// Output from the model; ends when the model closes the session
    pub events: ModelEventStream,
}

impl std::fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConnection").finish_non_exhaustive()
    }
}

/// A hosted model that supports live sessions
///
/// Implementations may drain `LiveConnection::input` only while their event
/// stream is polled. Callers must never block the poll loop on that input.
#[async_trait]
pub trait LiveModel: Send + Sync {
    /// Open a live session
    ///
    /// Transient failures should be reported with `EngineError::transient`
    /// so the caller can retry.
    async fn connect(&self, request: &LiveConnectRequest) -> EngineResult<LiveConnection>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_live_request_from_item() {
        let item = json!({
            "live_request": {
                "blob": {"mime_type": "audio/pcm;rate=16000", "data": "AAAA"}
            }
        });
        let request = LiveRequest::from_item(item).unwrap().unwrap();
        assert_eq!(request.blob.unwrap().mime_type, "audio/pcm;rate=16000");
        assert!(!request.close);
    }

    #[test]
    fn test_items_without_live_request() {
        assert!(LiveRequest::from_item(json!({"other": 1})).is_none());
        assert!(LiveRequest::from_item(json!("raw")).is_none());
        assert!(LiveRequest::from_item(json!({"live_request": null})).is_none());
    }

    #[test]
    fn test_invalid_live_request() {
        let result = LiveRequest::from_item(json!({"live_request": {"close": "yes"}})).unwrap();
        assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
    }
}
