//! Session service
//!
//! Sessions hold the persisted event history of a conversation. The
//! in-memory service lives for the process; the managed service is a client
//! for the hosting platform's session store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::{AgentEvent, EngineError, EngineResult};

/// A conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub events: Vec<AgentEvent>,
    pub last_update_time: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        app_name: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            state: Map::new(),
            events: Vec::new(),
            last_update_time: Utc::now(),
        }
    }
}

/// Storage for sessions and their events
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session; a random ID is assigned when `session_id` is `None`
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<Map<String, Value>>,
        session_id: Option<String>,
    ) -> EngineResult<Session>;

    /// Fetch a session with its events
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> EngineResult<Option<Session>>;

    /// List a user's sessions (events omitted)
    async fn list_sessions(&self, app_name: &str, user_id: &str) -> EngineResult<Vec<Session>>;

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> EngineResult<()>;

    /// Append a non-partial event to the session history
    async fn append_event(&self, session: &Session, event: &AgentEvent) -> EngineResult<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

type SessionKey = (String, String, String);

fn key(app_name: &str, user_id: &str, session_id: &str) -> SessionKey {
    (app_name.to_string(), user_id.to_string(), session_id.to_string())
}

/// Ephemeral in-process session storage
#[derive(Debug, Default)]
pub struct InMemorySessionService {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<Map<String, Value>>,
        session_id: Option<String>,
    ) -> EngineResult<Session> {
        let id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut sessions = self.sessions.write().await;

        let key = key(app_name, user_id, &id);
        if sessions.contains_key(&key) {
            return Err(EngineError::InvalidRequest(format!(
                "Session already exists: {}",
                id
            )));
        }

        let mut session = Session::new(id, app_name, user_id);
        session.state = state.unwrap_or_default();
        sessions.insert(key, session.clone());

        tracing::debug!(session_id = %session.id, user_id, "Created in-memory session");
        Ok(session)
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> EngineResult<Option<Session>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&key(app_name, user_id, session_id))
            .cloned())
    }

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> EngineResult<Vec<Session>> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<Session> = sessions
            .values()
            .filter(|s| s.app_name == app_name && s.user_id == user_id)
            .map(|s| Session {
                events: Vec::new(),
                ..s.clone()
            })
            .collect();
        list.sort_by(|a, b| a.last_update_time.cmp(&b.last_update_time));
        Ok(list)
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> EngineResult<()> {
        self.sessions
            .write()
            .await
            .remove(&key(app_name, user_id, session_id));
        Ok(())
    }

    async fn append_event(&self, session: &Session, event: &AgentEvent) -> EngineResult<()> {
        if event.partial {
            return Ok(());
        }

        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&key(&session.app_name, &session.user_id, &session.id))
            .ok_or_else(|| EngineError::SessionNotFound(session.id.clone()))?;

        stored.events.push(event.clone());
        stored.last_update_time = event.timestamp;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}
