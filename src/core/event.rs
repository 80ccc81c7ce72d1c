//! Output events streamed from a live session
//!
//! Events are relayed to the caller as plain JSON values so the adapter can
//! pass them through without knowing their shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single event produced during a live invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Unique event ID
    pub id: String,

    /// Invocation this event belongs to
    pub invocation_id: String,

    /// Who produced the event (agent name or "user")
    pub author: String,

    /// Content payload (`{"role": ..., "parts": [...]}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,

    /// Whether this is an incremental fragment of a larger response
    #[serde(default)]
    pub partial: bool,

    /// Model finished its turn
    #[serde(default)]
    pub turn_complete: bool,

    /// Model output was interrupted by the user
    #[serde(default)]
    pub interrupted: bool,

    /// When the event was produced
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    /// Create an empty event for the given invocation and author
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            content: None,
            partial: false,
            turn_complete: false,
            interrupted: false,
            timestamp: Utc::now(),
        }
    }

    /// Attach content
    pub fn with_content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    /// Mark as partial
    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Whether the event should be persisted to the session history
    pub fn is_persistent(&self) -> bool {
        !self.partial && self.content.is_some()
    }

    /// Serialize to the JSON form yielded to callers
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
