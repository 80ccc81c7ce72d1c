//! Hosting platform interface
//!
//! The deployment adapter delegates streaming execution to an
//! `AgentPlatform`. `LivePlatform` is an in-process implementation that
//! drives a `LiveModel`.

pub mod live;
mod runner;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::App;
use crate::core::EngineResult;
use crate::services::Services;
use crate::streaming::{EventStream, RequestSource};

pub use live::{
    Blob, FunctionCall, FunctionResponse, LiveConnectRequest, LiveConnection, LiveInput,
    LiveModel, LiveRequest, ModelEvent, ModelEventStream,
};
pub use runner::LivePlatform;

#[cfg(test)]
pub(crate) use runner::tests::EchoModel;

/// Operation names grouped by invocation scope
pub type Operations = BTreeMap<String, Vec<String>>;

/// Scope of plain request/response operations
pub const DEFAULT_SCOPE: &str = "";

/// Scope of the awaitable request/response operations
pub const ASYNC_SCOPE: &str = "async";

/// Name prefix of operations in the async scope
pub const ASYNC_PREFIX: &str = "async_";

/// Session operations served by every app
pub const SESSION_OPERATIONS: [&str; 4] =
    ["get_session", "list_sessions", "create_session", "delete_session"];

/// Operations every ADK-style app serves
///
/// Each session operation appears once in the root scope and once, prefixed,
/// in the async scope. Both names run the same handler.
pub fn adk_default_operations() -> Operations {
    let mut operations = Operations::new();
    operations.insert(
        DEFAULT_SCOPE.to_string(),
        SESSION_OPERATIONS.iter().map(|op| op.to_string()).collect(),
    );
    operations.insert(
        ASYNC_SCOPE.to_string(),
        SESSION_OPERATIONS
            .iter()
            .map(|op| format!("{}{}", ASYNC_PREFIX, op))
            .collect(),
    );
    operations
}

/// The hosting platform's execution primitives
#[async_trait]
pub trait AgentPlatform: Send + Sync {
    /// Operations registered before any adapter additions
    fn default_operations(&self) -> Operations;

    /// One-time setup after services are resolved
    async fn set_up(&self, _app: &App, _services: &Services) -> EngineResult<()> {
        Ok(())
    }

    /// Run a bidirectional session reading requests from `source`
    ///
    /// The first item must carry `user_id` and normally `run_config`.
    async fn bidi_stream_query(
        &self,
        app: Arc<App>,
        services: Services,
        source: Box<dyn RequestSource>,
    ) -> EngineResult<EventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adk_default_operations() {
        let ops = adk_default_operations();
        assert_eq!(ops[DEFAULT_SCOPE].len(), 4);
        assert!(ops[DEFAULT_SCOPE].contains(&"create_session".to_string()));
        assert_eq!(ops[ASYNC_SCOPE][0], "async_get_session");
        assert_eq!(ops.len(), 2);
        assert!(!ops.contains_key("bidi_stream"));
    }
}
