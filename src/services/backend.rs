//! Backend selection
//!
//! Session and artifact backends are chosen once from the startup
//! `EngineConfig` and never swapped afterwards.

use std::sync::Arc;

use serde::Serialize;

use super::artifact::{ArtifactService, InMemoryArtifactService};
use super::auth::TokenSource;
use super::gcs_artifact::GcsArtifactService;
use super::session::{InMemorySessionService, SessionService};
use super::vertex_session::VertexAiSessionService;
use crate::agent::App;
use crate::config::EngineConfig;

/// Which session store to use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionBackend {
    /// In-process, lost on exit
    Ephemeral,
    /// Platform session store for the given engine
    Managed {
        project: String,
        location: String,
        /// Engine ID sessions are filed under
        app_name: String,
    },
}

impl SessionBackend {
    /// Managed iff the platform assigned an engine ID
    pub fn select(config: &EngineConfig) -> Self {
        match config.agent_engine_id.as_deref().filter(|id| !id.is_empty()) {
            Some(engine_id) => SessionBackend::Managed {
                project: config.project.clone(),
                location: config.location.clone(),
                app_name: engine_id.to_string(),
            },
            None => SessionBackend::Ephemeral,
        }
    }

    /// App name the backend requires, if any
    pub fn required_app_name(&self) -> Option<&str> {
        match self {
            SessionBackend::Ephemeral => None,
            SessionBackend::Managed { app_name, .. } => Some(app_name.as_str()),
        }
    }

    /// Give `app` the name this backend files sessions under
    ///
    /// Must run before any session service is built for the app.
    pub fn bind_app(&self, app: App) -> App {
        match self.required_app_name() {
            Some(engine_id) if engine_id != app.name() => {
                tracing::info!(from = %app.name(), to = %engine_id, "Renaming app to engine ID");
                app.renamed(engine_id)
            }
            _ => app,
        }
    }

    pub fn build(&self, tokens: &TokenSource) -> Arc<dyn SessionService> {
        match self {
            SessionBackend::Ephemeral => Arc::new(InMemorySessionService::new()),
            SessionBackend::Managed {
                project, location, ..
            } => Arc::new(VertexAiSessionService::new(
                project.clone(),
                location.clone(),
                tokens.clone(),
            )),
        }
    }
}

/// Which artifact store to use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactBackend {
    /// In-process, lost on exit
    Ephemeral,
    /// Storage bucket
    Managed { bucket: String },
}

impl ArtifactBackend {
    /// Managed iff a logs bucket is configured
    pub fn select(config: &EngineConfig) -> Self {
        match config.logs_bucket_name.as_deref().filter(|b| !b.is_empty()) {
            Some(bucket) => ArtifactBackend::Managed {
                bucket: bucket.to_string(),
            },
            None => ArtifactBackend::Ephemeral,
        }
    }

    pub fn build(&self, tokens: &TokenSource) -> Arc<dyn ArtifactService> {
        match self {
            ArtifactBackend::Ephemeral => Arc::new(InMemoryArtifactService::new()),
            ArtifactBackend::Managed { bucket } => {
                Arc::new(GcsArtifactService::new(bucket.clone(), tokens.clone()))
            }
        }
    }
}

/// Services resolved at startup
#[derive(Clone)]
pub struct Services {
    pub sessions: Arc<dyn SessionService>,
    pub artifacts: Arc<dyn ArtifactService>,
}

impl Services {
    pub fn new(sessions: Arc<dyn SessionService>, artifacts: Arc<dyn ArtifactService>) -> Self {
        Self {
            sessions,
            artifacts,
        }
    }

    /// Both stores in-process
    pub fn ephemeral() -> Self {
        Self::new(
            Arc::new(InMemorySessionService::new()),
            Arc::new(InMemoryArtifactService::new()),
        )
    }

    pub fn build(
        session_backend: &SessionBackend,
        artifact_backend: &ArtifactBackend,
        tokens: &TokenSource,
    ) -> Self {
        Self::new(session_backend.build(tokens), artifact_backend.build(tokens))
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("sessions", &self.sessions.backend_name())
            .field("artifacts", &self.artifacts.backend_name())
            .finish()
    }
}
