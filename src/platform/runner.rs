//! In-process bidi runner
//!
//! Reads the handshake from the first request, resolves the session, opens
//! a live model connection and relays model output as agent events. Tool
//! calls from the model are executed through the agent's registry.
//!
//! # Request protocol
//!
//! ```text
//! first:  {"user_id": "...", "session_id"?: "...", "run_config"?: {...}, "live_request"?: {...}}
//! later:  {"live_request": {"content"|"blob"|"activity_start"|"activity_end"|"close": ...}}
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::live::{
    FunctionCall, FunctionResponse, LiveConnectRequest, LiveConnection, LiveInput, LiveModel,
    LiveRequest, ModelEvent,
};
use super::{adk_default_operations, AgentPlatform, Operations};
use crate::agent::{Agent, App, RunConfig};
use crate::core::{AgentEvent, EngineError, EngineResult};
use crate::services::{Services, Session, SessionService};
use crate::streaming::{EventStream, RequestSource, RUN_CONFIG_KEY};
use crate::tools::ToolResult;

/// Base delay between connect attempts (multiplied by the attempt number)
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Parsed first request
#[derive(Debug)]
struct Handshake {
    user_id: String,
    session_id: Option<String>,
    run_config: RunConfig,
    live_request: Option<LiveRequest>,
}

impl Handshake {
    fn parse(item: Value) -> EngineResult<Self> {
        let Value::Object(mut map) = item else {
            return Err(EngineError::InvalidRequest(
                "The first request must be a mapping.".into(),
            ));
        };

        let user_id = map
            .get("user_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EngineError::InvalidRequest("The first request must have a user_id.".into()))?
            .to_string();

        let session_id = match map.remove("session_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) if s.contains('/') || s == "." || s == ".." => {
                return Err(EngineError::InvalidRequest(format!(
                    "session_id must be a plain identifier, got {:?}",
                    s
                )))
            }
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                return Err(EngineError::InvalidRequest(format!(
                    "session_id must be a string, got {}",
                    other
                )))
            }
        };

        let run_config = match map.remove(RUN_CONFIG_KEY) {
            None | Some(Value::Null) => RunConfig::default(),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| EngineError::InvalidRequest(format!("invalid run_config: {}", e)))?,
        };

        let live_request = LiveRequest::from_item(Value::Object(map)).transpose()?;

        Ok(Self {
            user_id,
            session_id,
            run_config,
            live_request,
        })
    }
}

/// Aborts the request forwarder when the output stream is dropped
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Move request items from the caller to the model until either side closes
async fn forward_requests(source: Box<dyn RequestSource>, input: mpsc::Sender<LiveInput>) {
    loop {
        match source.next().await {
            Ok(Some(item)) => match LiveRequest::from_item(item) {
                Some(Ok(request)) => {
                    let close = request.close;
                    if input.send(LiveInput::Request(request)).await.is_err() || close {
                        break;
                    }
                }
                Some(Err(e)) => tracing::warn!("Skipping malformed request: {}", e),
                None => tracing::debug!("Skipping request without live_request"),
            },
            Ok(None) => {
                tracing::debug!("Request source closed");
                let _ = input.send(LiveInput::Request(LiveRequest::close())).await;
                break;
            }
            Err(e) => {
                tracing::warn!("Request source failed: {}", e);
                let _ = input.send(LiveInput::Request(LiveRequest::close())).await;
                break;
            }
        }
    }
}

/// State of one running live invocation
struct LiveInvocation {
    invocation_id: String,
    agent: Arc<Agent>,
    session: Session,
    sessions: Arc<dyn SessionService>,
    input: mpsc::Sender<LiveInput>,
}

impl LiveInvocation {
    fn event(&self) -> AgentEvent {
        AgentEvent::new(&self.invocation_id, self.agent.name())
    }

    async fn persist(&self, event: &AgentEvent) -> EngineResult<()> {
        if event.is_persistent() {
            self.sessions.append_event(&self.session, event).await?;
        }
        Ok(())
    }

    async fn call_tools(&self, calls: Vec<FunctionCall>) -> Vec<FunctionResponse> {
        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            let result = match self.agent.tools().execute(&call.name, &call.args).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(tool = %call.name, "Tool call failed: {}", e);
                    ToolResult::error(e.to_string())
                }
            };
            responses.push(FunctionResponse {
                id: call.id,
                name: call.name,
                response: result.to_response(),
            });
        }
        responses
    }

    /// Hand tool responses back to the model without waiting on its input
    ///
    /// The model may only drain input while its event stream is polled, and
    /// this runs inside that poll loop. When the channel is full the send
    /// moves to a task of its own.
    fn send_tool_responses(&self, responses: Vec<FunctionResponse>) -> EngineResult<()> {
        match self.input.try_send(LiveInput::ToolResponse(responses)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(pending)) => {
                tracing::debug!(invocation_id = %self.invocation_id, "Model input full, deferring tool response");
                let input = self.input.clone();
                tokio::spawn(async move {
                    if input.send(pending).await.is_err() {
                        tracing::debug!("Model closed before the tool response was delivered");
                    }
                });
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(EngineError::ChannelClosed),
        }
    }

    /// Turn one model event into the agent events to emit
    async fn handle(&self, event: ModelEvent) -> EngineResult<Vec<AgentEvent>> {
        let events = match event {
            ModelEvent::Content { content, partial } => {
                vec![self.event().with_content(content).with_partial(partial)]
            }
            ModelEvent::ToolCall(calls) => {
                let call_parts: Vec<Value> = calls
                    .iter()
                    .map(|c| json!({ "function_call": c }))
                    .collect();
                let call_event = self
                    .event()
                    .with_content(json!({ "role": "model", "parts": call_parts }));

                let responses = self.call_tools(calls).await;
                let response_parts: Vec<Value> = responses
                    .iter()
                    .map(|r| json!({ "function_response": r }))
                    .collect();
                let response_event = self
                    .event()
                    .with_content(json!({ "role": "user", "parts": response_parts }));

                self.send_tool_responses(responses)?;

                vec![call_event, response_event]
            }
            ModelEvent::TurnComplete => {
                let mut event = self.event();
                event.turn_complete = true;
                vec![event]
            }
            ModelEvent::Interrupted => {
                let mut event = self.event();
                event.interrupted = true;
                vec![event]
            }
        };

        for event in &events {
            self.persist(event).await?;
        }
        Ok(events)
    }
}

/// Platform implementation that runs live sessions in-process
pub struct LivePlatform<M> {
    model: Arc<M>,
    retry_backoff: Duration,
}

impl<M: LiveModel + 'static> LivePlatform<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            model,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Set the base delay between connect attempts
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Connect, retrying transient failures up to the model's attempt count
    async fn connect(&self, request: &LiveConnectRequest) -> EngineResult<LiveConnection> {
        let attempts = request.model.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.model.connect(request).await {
                Ok(connection) => return Ok(connection),
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        model = %request.model.model,
                        "Live connect failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<M: LiveModel + 'static> AgentPlatform for LivePlatform<M> {
    fn default_operations(&self) -> Operations {
        adk_default_operations()
    }

    async fn set_up(&self, app: &App, services: &Services) -> EngineResult<()> {
        tracing::info!(
            app = %app.name(),
            agent = %app.root_agent().name(),
            services = ?services,
            "Live platform ready"
        );
        Ok(())
    }

    async fn bidi_stream_query(
        &self,
        app: Arc<App>,
        services: Services,
        source: Box<dyn RequestSource>,
    ) -> EngineResult<EventStream> {
        let first = source.next().await?.ok_or_else(|| {
            EngineError::InvalidRequest("Request source closed before the first request.".into())
        })?;
        let handshake = Handshake::parse(first)?;

        let session = match handshake.session_id {
            Some(id) => services
                .sessions
                .get_session(app.name(), &handshake.user_id, &id)
                .await?
                .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?,
            None => {
                services
                    .sessions
                    .create_session(app.name(), &handshake.user_id, None, None)
                    .await?
            }
        };

        let agent = Arc::clone(app.root_agent());
        let request = LiveConnectRequest {
            model: agent.model().clone(),
            instruction: agent.instruction().to_string(),
            tools: agent.tool_declarations(),
            run_config: handshake.run_config,
        };

        let LiveConnection { input, mut events } = self.connect(&request).await?;

        if let Some(live_request) = handshake.live_request {
            input
                .send(LiveInput::Request(live_request))
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
        }

        let invocation = LiveInvocation {
            invocation_id: format!("e-{}", Uuid::new_v4()),
            agent,
            session,
            sessions: Arc::clone(&services.sessions),
            input: input.clone(),
        };

        tracing::info!(
            invocation_id = %invocation.invocation_id,
            session_id = %invocation.session.id,
            user_id = %invocation.session.user_id,
            "Starting live invocation"
        );

        let forwarder = AbortOnDrop(tokio::spawn(forward_requests(source, input)));

        let stream = async_stream::stream! {
            let _forwarder = forwarder;
            while let Some(next) = events.next().await {
                let handled = match next {
                    Ok(event) => invocation.handle(event).await,
                    Err(e) => Err(e),
                };
                match handled {
                    Ok(produced) => {
                        for event in produced {
                            yield event.to_value().map_err(EngineError::from);
                        }
                    }
                    Err(e) => {
                        tracing::error!(invocation_id = %invocation.invocation_id, "Live invocation failed: {}", e);
                        yield Err(e);
                        break;
                    }
                }
            }
            tracing::info!(invocation_id = %invocation.invocation_id, "Live invocation finished");
        };

        Ok(Box::pin(stream))
    }
}
