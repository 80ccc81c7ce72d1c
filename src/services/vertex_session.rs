//! Managed session service client
//!
//! Talks to the hosting platform's session store over REST. Sessions are
//! filed under the reasoning engine whose ID equals the app name.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::auth::TokenSource;
use super::session::{Session, SessionService};
use crate::core::{AgentEvent, EngineError, EngineResult};

/// Polls while waiting for session creation to finish
const CREATE_POLL_ATTEMPTS: u32 = 5;
const CREATE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSession {
    name: String,
    user_id: String,
    #[serde(default)]
    session_state: Option<Map<String, Value>>,
    update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventMetadata {
    #[serde(default)]
    partial: bool,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    interrupted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    name: String,
    author: String,
    invocation_id: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    event_metadata: Option<ApiEventMetadata>,
}

impl From<ApiEvent> for AgentEvent {
    fn from(api: ApiEvent) -> Self {
        let meta = api.event_metadata.unwrap_or_default();
        AgentEvent {
            id: last_segment(&api.name).to_string(),
            invocation_id: api.invocation_id,
            author: api.author,
            content: api.content,
            partial: meta.partial,
            turn_complete: meta.turn_complete,
            interrupted: meta.interrupted,
            timestamp: api.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSessionsResponse {
    #[serde(default)]
    sessions: Vec<ApiSession>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEventsResponse {
    #[serde(default)]
    session_events: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<Value>,
}

/// Reject IDs that would escape their place in the resource path
fn check_segment(id: &str) -> EngineResult<&str> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(EngineError::InvalidRequest(format!(
            "invalid resource ID: {:?}",
            id
        )));
    }
    Ok(id)
}

/// Append path segments, percent-encoding each one
fn push_segments<'a>(url: &mut Url, segments: impl IntoIterator<Item = &'a str>) -> EngineResult<()> {
    url.path_segments_mut()
        .map_err(|_| EngineError::InvalidConfig("session API URL cannot be a base".into()))?
        .extend(segments);
    Ok(())
}

fn last_segment(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Session ID from an operation name `.../sessions/{id}/operations/{op}`
fn session_id_from_operation(name: &str) -> Option<&str> {
    let parts: Vec<&str> = name.split('/').collect();
    let idx = parts.iter().rposition(|p| *p == "sessions")?;
    parts.get(idx + 1).copied().filter(|s| !s.is_empty())
}

/// Request body for `:appendEvent`
fn event_body(event: &AgentEvent) -> Value {
    let mut body = json!({
        "author": event.author,
        "invocationId": event.invocation_id,
        "timestamp": event.timestamp.to_rfc3339(),
        "eventMetadata": {
            "partial": event.partial,
            "turnComplete": event.turn_complete,
            "interrupted": event.interrupted,
        },
    });
    if let Some(content) = &event.content {
        body["content"] = content.clone();
    }
    body
}

/// Session service backed by the managed session store
#[derive(Debug, Clone)]
pub struct VertexAiSessionService {
    client: Client,
    project: String,
    location: String,
    tokens: TokenSource,
}

impl VertexAiSessionService {
    pub fn new(project: impl Into<String>, location: impl Into<String>, tokens: TokenSource) -> Self {
        Self {
            client: Client::new(),
            project: project.into(),
            location: location.into(),
            tokens,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn api_root(&self) -> String {
        format!("https://{}-aiplatform.googleapis.com/v1beta1", self.location)
    }

    /// API root with `segments` appended
    fn api_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> EngineResult<Url> {
        let mut url = Url::parse(&self.api_root())
            .map_err(|e| EngineError::InvalidConfig(format!("session API URL: {}", e)))?;
        push_segments(&mut url, segments)?;
        Ok(url)
    }

    /// Collection URL for sessions of one engine
    pub fn sessions_url(&self, app_name: &str) -> EngineResult<Url> {
        self.api_url([
            "projects",
            self.project.as_str(),
            "locations",
            self.location.as_str(),
            "reasoningEngines",
            check_segment(app_name)?,
            "sessions",
        ])
    }

    /// URL of one session
    pub fn session_url(&self, app_name: &str, session_id: &str) -> EngineResult<Url> {
        let mut url = self.sessions_url(app_name)?;
        push_segments(&mut url, [check_segment(session_id)?])?;
        Ok(url)
    }

    async fn request(&self, method: Method, url: Url) -> EngineResult<RequestBuilder> {
        let token = self.tokens.bearer().await?;
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn wait_for_operation(&self, mut op: Operation) -> EngineResult<()> {
        for _ in 0..CREATE_POLL_ATTEMPTS {
            if let Some(error) = op.error {
                return Err(EngineError::permanent(format!(
                    "Session creation failed: {}",
                    error
                )));
            }
            if op.done {
                return Ok(());
            }
            tokio::time::sleep(CREATE_POLL_INTERVAL).await;
            let url = self.api_url(op.name.split('/'))?;
            op = self
                .request(Method::GET, url)
                .await?
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
        }
        Err(EngineError::transient("Timed out waiting for session creation"))
    }

    async fn list_events(&self, app_name: &str, session_id: &str) -> EngineResult<Vec<AgentEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.session_url(app_name, session_id)?;
            push_segments(&mut url, ["events"])?;
            let mut req = self.request(Method::GET, url).await?;
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }
            let page: ListEventsResponse = req.send().await?.error_for_status()?.json().await?;
            events.extend(page.session_events.into_iter().map(AgentEvent::from));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(events)
    }
}

#[async_trait]
impl SessionService for VertexAiSessionService {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<Map<String, Value>>,
        session_id: Option<String>,
    ) -> EngineResult<Session> {
        if session_id.is_some() {
            return Err(EngineError::InvalidRequest(
                "Managed sessions do not accept caller-assigned IDs".into(),
            ));
        }

        let mut body = json!({ "userId": user_id });
        if let Some(state) = &state {
            body["sessionState"] = Value::Object(state.clone());
        }

        let op: Operation = self
            .request(Method::POST, self.sessions_url(app_name)?)
            .await?
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let id = session_id_from_operation(&op.name)
            .ok_or_else(|| EngineError::platform(format!("Unexpected operation name: {}", op.name)))?
            .to_string();
        self.wait_for_operation(op).await?;

        tracing::info!(session_id = %id, user_id, "Created managed session");

        let mut session = Session::new(id, app_name, user_id);
        session.state = state.unwrap_or_default();
        Ok(session)
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> EngineResult<Option<Session>> {
        let url = self.session_url(app_name, session_id)?;
        let response = self.request(Method::GET, url).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let api: ApiSession = response.error_for_status()?.json().await?;

        if api.user_id != user_id {
            return Ok(None);
        }

        Ok(Some(Session {
            id: last_segment(&api.name).to_string(),
            app_name: app_name.to_string(),
            user_id: api.user_id,
            state: api.session_state.unwrap_or_default(),
            events: self.list_events(app_name, session_id).await?,
            last_update_time: api.update_time.unwrap_or_else(Utc::now),
        }))
    }

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> EngineResult<Vec<Session>> {
        let filter = format!("user_id=\"{}\"", user_id);
        let response: ListSessionsResponse = self
            .request(Method::GET, self.sessions_url(app_name)?)
            .await?
            .query(&[("filter", filter.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .sessions
            .into_iter()
            .map(|api| Session {
                id: last_segment(&api.name).to_string(),
                app_name: app_name.to_string(),
                user_id: api.user_id,
                state: api.session_state.unwrap_or_default(),
                events: Vec::new(),
                last_update_time: api.update_time.unwrap_or_else(Utc::now),
            })
            .collect())
    }

    async fn delete_session(
        &self,
        app_name: &str,
        _user_id: &str,
        session_id: &str,
    ) -> EngineResult<()> {
        let url = self.session_url(app_name, session_id)?;
        let response = self.request(Method::DELETE, url).await?.send().await?;
        if response.status() != StatusCode::NOT_FOUND {
            response.error_for_status()?;
        }
        Ok(())
    }

    async fn append_event(&self, session: &Session, event: &AgentEvent) -> EngineResult<()> {
        if event.partial {
            return Ok(());
        }
        let mut url = self.sessions_url(&session.app_name)?;
        let method = format!("{}:appendEvent", check_segment(&session.id)?);
        push_segments(&mut url, [method.as_str()])?;
        self.request(Method::POST, url)
            .await?
            .json(&event_body(event))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "vertex_ai"
    }
}
