//! Config-injecting request queue
//!
//! Wraps a request source so that the first item retrieved carries the
//! serialized run configuration under `run_config`. Every later item passes
//! through untouched.

use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::source::RequestSource;
use crate::agent::RunConfig;
use crate::core::EngineResult;

/// Key the run configuration is stored under
pub const RUN_CONFIG_KEY: &str = "run_config";

const PENDING: u8 = 0;
const INJECTED: u8 = 1;

/// Latch state of a [`ConfigInjectingQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionState {
    /// No item retrieved yet
    Pending,
    /// First item has been retrieved
    Injected,
}

/// Request source decorator that injects the run configuration once
pub struct ConfigInjectingQueue<S> {
    inner: S,
    config: Value,
    state: AtomicU8,
}

impl<S: RequestSource> ConfigInjectingQueue<S> {
    /// Wrap `inner`, serializing `run_config` up front
    pub fn new(inner: S, run_config: &RunConfig) -> EngineResult<Self> {
        Ok(Self::with_value(inner, run_config.to_value()?))
    }

    /// Wrap `inner` with an already-serialized configuration
    pub fn with_value(inner: S, config: Value) -> Self {
        Self {
            inner,
            config,
            state: AtomicU8::new(PENDING),
        }
    }

    pub fn state(&self) -> InjectionState {
        match self.state.load(Ordering::Acquire) {
            PENDING => InjectionState::Pending,
            _ => InjectionState::Injected,
        }
    }

    fn claim(&self) -> bool {
        self.state
            .compare_exchange(PENDING, INJECTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[async_trait]
impl<S: RequestSource> RequestSource for ConfigInjectingQueue<S> {
    async fn next(&self) -> EngineResult<Option<Value>> {
        let Some(mut item) = self.inner.next().await? else {
            return Ok(None);
        };

        if self.claim() {
            match item.as_object_mut() {
                Some(map) => {
                    map.insert(RUN_CONFIG_KEY.to_string(), self.config.clone());
                    tracing::debug!("Injected run_config into first request");
                }
                None => {
                    tracing::debug!("First request is not a mapping; run_config not injected");
                }
            }
        }

        Ok(Some(item))
    }
}

impl<S> std::fmt::Debug for ConfigInjectingQueue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigInjectingQueue")
            .field("injected", &(self.state.load(Ordering::Acquire) == INJECTED))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineError;
    use crate::streaming::{create_request_queue, send_request};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Source replaying a fixed script of results
    struct ScriptedSource {
        items: Mutex<VecDeque<EngineResult<Option<Value>>>>,
    }

    impl ScriptedSource {
        fn new(items: Vec<EngineResult<Option<Value>>>) -> Self {
            Self {
                items: Mutex::new(items.into()),
            }
        }
    }

    #[async_trait]
    impl RequestSource for ScriptedSource {
        async fn next(&self) -> EngineResult<Option<Value>> {
            self.items.lock().await.pop_front().unwrap_or(Ok(None))
        }
    }

    #[tokio::test]
    async fn test_injects_first_mapping_only() {
        let (tx, source) = create_request_queue();
        let queue = ConfigInjectingQueue::with_value(source, json!({"x": 1}));

        send_request(&tx, json!({"a": 1})).await.unwrap();
        send_request(&tx, json!({"b": 2})).await.unwrap();

        assert_eq!(
            queue.next().await.unwrap(),
            Some(json!({"a": 1, "run_config": {"x": 1}}))
        );
        assert_eq!(queue.next().await.unwrap(), Some(json!({"b": 2})));
        assert_eq!(queue.state(), InjectionState::Injected);
    }

    #[tokio::test]
    async fn test_non_mapping_first_item_consumes_latch() {
        let (tx, source) = create_request_queue();
        let queue = ConfigInjectingQueue::with_value(source, json!({"x": 1}));

        send_request(&tx, json!("raw_bytes_item")).await.unwrap();
        send_request(&tx, json!({"b": 2})).await.unwrap();

        assert_eq!(queue.next().await.unwrap(), Some(json!("raw_bytes_item")));
        assert_eq!(queue.state(), InjectionState::Injected);
        assert_eq!(queue.next().await.unwrap(), Some(json!({"b": 2})));
    }

    #[tokio::test]
    async fn test_source_error_propagates_without_consuming_latch() {
        let source = ScriptedSource::new(vec![
            Err(EngineError::ChannelClosed),
            Ok(Some(json!({"a": 1}))),
        ]);
        let queue = ConfigInjectingQueue::with_value(source, json!({"x": 1}));

        let err = queue.next().await.unwrap_err();
        assert!(matches!(err, EngineError::ChannelClosed));
        assert_eq!(queue.state(), InjectionState::Pending);

        assert_eq!(
            queue.next().await.unwrap(),
            Some(json!({"a": 1, "run_config": {"x": 1}}))
        );
    }

    #[tokio::test]
    async fn test_closed_source_leaves_latch_pending() {
        let (tx, source) = create_request_queue();
        drop(tx);
        let queue = ConfigInjectingQueue::with_value(source, json!({"x": 1}));

        assert!(queue.next().await.unwrap().is_none());
        assert_eq!(queue.state(), InjectionState::Pending);
    }

    #[tokio::test]
    async fn test_existing_run_config_is_replaced() {
        let (tx, source) = create_request_queue();
        let queue = ConfigInjectingQueue::with_value(source, json!({"x": 1}));

        send_request(&tx, json!({"run_config": "caller"})).await.unwrap();
        assert_eq!(
            queue.next().await.unwrap(),
            Some(json!({"run_config": {"x": 1}}))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumers_inject_once() {
        let (tx, source) = create_request_queue();
        let queue = Arc::new(ConfigInjectingQueue::with_value(source, json!({"x": 1})));

        for i in 0..32 {
            send_request(&tx, json!({ "i": i })).await.unwrap();
        }
        drop(tx);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(item) = queue.next().await.unwrap() {
                    seen.push(item);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }

        assert_eq!(all.len(), 32);
        let injected = all
            .iter()
            .filter(|item| item.get(RUN_CONFIG_KEY).is_some())
            .count();
        assert_eq!(injected, 1);
    }

    #[tokio::test]
    async fn test_new_serializes_run_config() {
        let (tx, source) = create_request_queue();
        let run_config = RunConfig::with_replicated_voice(b"abc");
        let queue = ConfigInjectingQueue::new(source, &run_config).unwrap();

        send_request(&tx, json!({"user_id": "u"})).await.unwrap();
        let item = queue.next().await.unwrap().unwrap();
        assert_eq!(item[RUN_CONFIG_KEY]["response_modalities"], json!(["AUDIO"]));
    }
}
