//! Deployment adapter
//!
//! `AgentEngineApp` wraps the hosting platform's deployment object. It
//! resolves the session and artifact backends, logs user feedback, and
//! injects the run configuration into bidirectional streams.
//!
//! ```ignore
//! let config = EngineConfig::from_env()?;
//! let _guard = logging::init_logging(&config.logging);
//! let run_config = RunConfig::from_voice_sample(&config.voice_sample_path)?;
//! let engine = AgentEngineApp::initialize(config, build_app(), run_config, platform).await?;
//!
//! let mut events = engine.bidi_stream_query(source).await?;
//! while let Some(event) = events.next().await { /* ... */ }
//! ```

use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::agent::{App, RunConfig};
use crate::config::EngineConfig;
use crate::core::{EngineError, EngineResult};
use crate::feedback::{FeedbackLogger, StructuredLogSink, TracingLogSink};
use crate::logging;
use crate::platform::{AgentPlatform, Operations, ASYNC_PREFIX, DEFAULT_SCOPE};
use crate::services::{ArtifactBackend, Services, Session, SessionBackend, TokenSource};
use crate::streaming::{ConfigInjectingQueue, EventStream, RequestSource};

/// Root-scope operation for feedback
pub const FEEDBACK_OPERATION: &str = "register_feedback";

/// Scope for bidirectional streaming operations
pub const BIDI_STREAM_SCOPE: &str = "bidi_stream";

/// Bidirectional streaming entry point
pub const BIDI_STREAM_OPERATION: &str = "bidi_stream_query";

/// Add the adapter's operations to the platform defaults
///
/// `register_feedback` is appended to the root scope; `bidi_stream` maps to
/// the streaming entry point.
pub fn register_operations(mut operations: Operations) -> Operations {
    operations
        .entry(DEFAULT_SCOPE.to_string())
        .or_default()
        .push(FEEDBACK_OPERATION.to_string());
    operations.insert(
        BIDI_STREAM_SCOPE.to_string(),
        vec![BIDI_STREAM_OPERATION.to_string()],
    );
    operations
}

/// Input of the session operations
#[derive(Debug, Deserialize)]
struct SessionRequest {
    user_id: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    state: Option<Map<String, Value>>,
}

impl SessionRequest {
    fn parse(input: Value) -> EngineResult<Self> {
        serde_json::from_value(input)
            .map_err(|e| EngineError::InvalidRequest(format!("invalid session request: {}", e)))
    }

    fn session_id(&self) -> EngineResult<&str> {
        self.session_id
            .as_deref()
            .ok_or_else(|| EngineError::InvalidRequest("session_id is required".into()))
    }
}

/// The deployed agent
pub struct AgentEngineApp<P> {
    config: EngineConfig,
    app: Arc<App>,
    run_config: Arc<RunConfig>,
    run_config_value: Value,
    platform: Arc<P>,
    session_backend: SessionBackend,
    artifact_backend: ArtifactBackend,
    services: Services,
    feedback: FeedbackLogger,
}

impl<P: AgentPlatform> AgentEngineApp<P> {
    /// One-time setup, logging feedback through `tracing`
    pub async fn initialize(
        config: EngineConfig,
        app: App,
        run_config: RunConfig,
        platform: Arc<P>,
    ) -> EngineResult<Self> {
        let sink = Arc::new(TracingLogSink::new(module_path!()));
        Self::initialize_with_sink(config, app, run_config, platform, sink).await
    }

    /// One-time setup with a custom feedback sink
    pub async fn initialize_with_sink(
        config: EngineConfig,
        app: App,
        run_config: RunConfig,
        platform: Arc<P>,
        sink: Arc<dyn StructuredLogSink>,
    ) -> EngineResult<Self> {
        let session_backend = SessionBackend::select(&config);

        let app = session_backend.bind_app(app);

        logging::setup_telemetry(&config);

        let artifact_backend = ArtifactBackend::select(&config);
        let tokens = TokenSource::from_config(&config);
        let services = Services::build(&session_backend, &artifact_backend, &tokens);

        tracing::info!(
            app = %app.name(),
            session_backend = ?session_backend,
            artifact_backend = ?artifact_backend,
            "Agent engine initialized"
        );

        platform.set_up(&app, &services).await?;

        let run_config_value = run_config.to_value()?;

        Ok(Self {
            config,
            app: Arc::new(app),
            run_config: Arc::new(run_config),
            run_config_value,
            platform,
            session_backend,
            artifact_backend,
            services,
            feedback: FeedbackLogger::new(sink),
        })
    }

    /// Validate and log user feedback
    pub fn register_feedback(&self, payload: Value) -> EngineResult<()> {
        let feedback = self.feedback.register(payload)?;
        tracing::debug!(invocation_id = %feedback.invocation_id, "Feedback registered");
        Ok(())
    }

    /// Operation names advertised to the platform router
    pub fn list_operations(&self) -> Operations {
        register_operations(self.platform.default_operations())
    }

    pub async fn get_session(&self, user_id: &str, session_id: &str) -> EngineResult<Option<Session>> {
        self.services
            .sessions
            .get_session(self.app.name(), user_id, session_id)
            .await
    }

    pub async fn list_sessions(&self, user_id: &str) -> EngineResult<Vec<Session>> {
        self.services.sessions.list_sessions(self.app.name(), user_id).await
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        state: Option<Map<String, Value>>,
        session_id: Option<String>,
    ) -> EngineResult<Session> {
        self.services
            .sessions
            .create_session(self.app.name(), user_id, state, session_id)
            .await
    }

    pub async fn delete_session(&self, user_id: &str, session_id: &str) -> EngineResult<()> {
        self.services
            .sessions
            .delete_session(self.app.name(), user_id, session_id)
            .await
    }

    /// Run a request/response operation by its advertised name
    ///
    /// `async_`-prefixed names run the same handler as the plain name.
    /// The streaming entry point is `bidi_stream_query`, not this.
    pub async fn dispatch(&self, operation: &str, input: Value) -> EngineResult<Value> {
        if operation == FEEDBACK_OPERATION {
            self.register_feedback(input)?;
            return Ok(Value::Null);
        }

        let output = match operation.strip_prefix(ASYNC_PREFIX).unwrap_or(operation) {
            "get_session" => {
                let req = SessionRequest::parse(input)?;
                serde_json::to_value(self.get_session(&req.user_id, req.session_id()?).await?)?
            }
            "list_sessions" => {
                let req = SessionRequest::parse(input)?;
                serde_json::to_value(self.list_sessions(&req.user_id).await?)?
            }
            "create_session" => {
                let req = SessionRequest::parse(input)?;
                serde_json::to_value(
                    self.create_session(&req.user_id, req.state, req.session_id)
                        .await?,
                )?
            }
            "delete_session" => {
                let req = SessionRequest::parse(input)?;
                self.delete_session(&req.user_id, req.session_id()?).await?;
                Value::Null
            }
            _ => {
                return Err(EngineError::InvalidRequest(format!(
                    "Unknown operation: {}",
                    operation
                )))
            }
        };
        tracing::debug!(operation, "Operation dispatched");
        Ok(output)
    }

    /// Bidirectional streaming query with the run configuration injected
    ///
    /// Each call wraps `source` in a fresh injecting queue; output events are
    /// relayed unchanged.
    pub async fn bidi_stream_query<S>(&self, source: S) -> EngineResult<EventStream>
    where
        S: RequestSource + 'static,
    {
        let wrapped = ConfigInjectingQueue::with_value(source, self.run_config_value.clone());

        let mut inner = self
            .platform
            .bidi_stream_query(
                Arc::clone(&self.app),
                self.services.clone(),
                Box::new(wrapped),
            )
            .await?;

        let capture_content = self.config.telemetry.capture_message_content;
        let stream = async_stream::stream! {
            let mut relayed = 0usize;
            while let Some(event) = inner.next().await {
                relayed += 1;
                if capture_content {
                    if let Ok(value) = &event {
                        tracing::debug!(event = %value, "Relayed event");
                    }
                }
                yield event;
            }
            tracing::debug!(relayed, "Bidi stream ended");
        };

        Ok(Box::pin(stream))
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn session_backend(&self) -> &SessionBackend {
        &self.session_backend
    }

    pub fn artifact_backend(&self) -> &ArtifactBackend {
        &self.artifact_backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{build_app, Modality};
    use crate::feedback::tests::RecordingSink;
    use crate::platform::{adk_default_operations, EchoModel, LivePlatform};
    use crate::streaming::{create_request_queue, send_request, RUN_CONFIG_KEY};
    use async_trait::async_trait;
    use serde_json::json;

    /// Platform that drains the source and echoes every item as an event
    struct DrainingPlatform;

    #[async_trait]
    impl AgentPlatform for DrainingPlatform {
        fn default_operations(&self) -> Operations {
            adk_default_operations()
        }

        async fn bidi_stream_query(
            &self,
            _app: Arc<App>,
            _services: Services,
            source: Box<dyn RequestSource>,
        ) -> EngineResult<EventStream> {
            let stream = async_stream::stream! {
                loop {
                    match source.next().await {
                        Ok(Some(item)) => yield Ok(item),
                        Ok(None) => break,
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    }
                }
            };
            Ok(Box::pin(stream))
        }
    }

    async fn engine_with(
        config: EngineConfig,
        sink: Arc<RecordingSink>,
    ) -> AgentEngineApp<DrainingPlatform> {
        AgentEngineApp::initialize_with_sink(
            config,
            build_app(),
            RunConfig::with_replicated_voice(b"voice"),
            Arc::new(DrainingPlatform),
            sink,
        )
        .await
        .unwrap()
    }

    async fn engine() -> AgentEngineApp<DrainingPlatform> {
        engine_with(EngineConfig::new("p"), Arc::new(RecordingSink::default())).await
    }

    #[tokio::test]
    async fn test_list_operations_extends_defaults() {
        let engine = engine().await;
        let ops = engine.list_operations();
        let defaults = adk_default_operations();

        let root = &ops[DEFAULT_SCOPE];
        assert_eq!(&root[..defaults[DEFAULT_SCOPE].len()], &defaults[DEFAULT_SCOPE][..]);
        assert_eq!(root.last().map(String::as_str), Some(FEEDBACK_OPERATION));
        assert_eq!(ops[BIDI_STREAM_SCOPE], vec![BIDI_STREAM_OPERATION.to_string()]);
        assert_eq!(ops["async"], defaults["async"]);
    }

    #[tokio::test]
    async fn test_every_advertised_operation_dispatches() {
        let engine = engine().await;
        let created = engine
            .dispatch("create_session", json!({"user_id": "u", "state": {"k": 1}}))
            .await
            .unwrap();
        let session_id = created["id"].as_str().unwrap().to_string();

        let fetched = engine
            .dispatch("async_get_session", json!({"user_id": "u", "session_id": session_id}))
            .await
            .unwrap();
        assert_eq!(fetched["state"]["k"], 1);

        for (scope, names) in engine.list_operations() {
            for name in names {
                if scope == BIDI_STREAM_SCOPE {
                    assert_eq!(name, BIDI_STREAM_OPERATION);
                    continue;
                }
                let input = if name == FEEDBACK_OPERATION {
                    json!({"score": 1, "invocation_id": "inv"})
                } else if name.ends_with("create_session") || name.ends_with("list_sessions") {
                    json!({"user_id": "u"})
                } else {
                    json!({"user_id": "u", "session_id": session_id})
                };
                if let Err(e) = engine.dispatch(&name, input).await {
                    panic!("{} failed: {}", name, e);
                }
            }
        }

        let gone = engine
            .dispatch("get_session", json!({"user_id": "u", "session_id": session_id}))
            .await
            .unwrap();
        assert!(gone.is_null());
    }

    #[tokio::test]
    async fn test_dispatch_rejects_unknown_and_malformed() {
        let engine = engine().await;
        let err = engine.dispatch("stream_query", json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(ref m) if m.contains("stream_query")));

        let err = engine
            .dispatch("delete_session", json!({"user_id": "u"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(ref m) if m.contains("session_id")));

        let err = engine.dispatch("list_sessions", json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }

    #[test]
    fn test_register_operations_without_root_scope() {
        let ops = register_operations(Operations::new());
        assert_eq!(ops[DEFAULT_SCOPE], vec![FEEDBACK_OPERATION.to_string()]);
        assert_eq!(ops[BIDI_STREAM_SCOPE], vec![BIDI_STREAM_OPERATION.to_string()]);
    }

    #[tokio::test]
    async fn test_ephemeral_services_by_default() {
        let engine = engine().await;
        assert_eq!(engine.app().name(), "app");
        assert_eq!(engine.session_backend(), &SessionBackend::Ephemeral);
        assert_eq!(engine.artifact_backend(), &ArtifactBackend::Ephemeral);
        assert_eq!(engine.services().sessions.backend_name(), "in_memory");
        assert_eq!(engine.services().artifacts.backend_name(), "in_memory");
    }

    #[tokio::test]
    async fn test_managed_mode_renames_app() {
        let config = EngineConfig::new("p")
            .with_agent_engine_id("8675309")
            .with_logs_bucket("logs-bucket");
        let engine = engine_with(config, Arc::new(RecordingSink::default())).await;

        assert_eq!(engine.app().name(), "8675309");
        assert_eq!(engine.services().sessions.backend_name(), "vertex_ai");
        assert_eq!(engine.services().artifacts.backend_name(), "gcs");
    }

    #[tokio::test]
    async fn test_register_feedback_logs_valid_payload() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(EngineConfig::new("p"), sink.clone()).await;

        engine
            .register_feedback(json!({"score": 5, "invocation_id": "inv-1", "user_id": "u"}))
            .unwrap();

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0["invocation_id"], "inv-1");
    }

    #[tokio::test]
    async fn test_register_feedback_rejects_invalid_payload() {
        let sink = Arc::new(RecordingSink::default());
        let engine = engine_with(EngineConfig::new("p"), sink.clone()).await;

        let err = engine.register_feedback(json!({"text": "missing"})).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(sink.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bidi_stream_injects_first_item() {
        let engine = engine().await;
        let (tx, source) = create_request_queue();
        send_request(&tx, json!({"a": 1})).await.unwrap();
        send_request(&tx, json!({"b": 2})).await.unwrap();
        drop(tx);

        let events: Vec<Value> = engine
            .bidi_stream_query(source)
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["a"], 1);
        assert_eq!(events[0][RUN_CONFIG_KEY], engine.run_config().to_value().unwrap());
        assert_eq!(events[1], json!({"b": 2}));
    }

    #[tokio::test]
    async fn test_each_query_gets_fresh_latch() {
        let engine = engine().await;

        for _ in 0..2 {
            let (tx, source) = create_request_queue();
            send_request(&tx, json!({"user_id": "u"})).await.unwrap();
            drop(tx);

            let mut stream = engine.bidi_stream_query(source).await.unwrap();
            let first = stream.next().await.unwrap().unwrap();
            assert!(first.get(RUN_CONFIG_KEY).is_some());
        }
    }

    #[tokio::test]
    async fn test_bidi_stream_with_live_platform() {
        let model = Arc::new(EchoModel::default());
        let engine = AgentEngineApp::initialize(
            EngineConfig::new("p"),
            build_app(),
            RunConfig::with_replicated_voice(b"voice"),
            Arc::new(LivePlatform::new(Arc::clone(&model))),
        )
        .await
        .unwrap();

        let (tx, source) = create_request_queue();
        send_request(&tx, json!({"user_id": "u1"})).await.unwrap();
        send_request(
            &tx,
            json!({"live_request": {"content": {"role": "user", "parts": [{"text": "hi"}]}}}),
        )
        .await
        .unwrap();
        drop(tx);

        let events: Vec<Value> = engine
            .bidi_stream_query(source)
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["content"]["parts"][0]["text"], "hi");

        // The runner saw the injected voice configuration
        let requests = model.requests.lock().unwrap();
        assert_eq!(requests[0].run_config.response_modalities, vec![Modality::Audio]);
        assert_eq!(&requests[0].run_config, engine.run_config());
    }
}
