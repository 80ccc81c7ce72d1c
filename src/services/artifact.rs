//! Artifact service
//!
//! Artifacts are versioned binary blobs attached to a session, or to a user
//! when the filename carries the `user:` prefix.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::{EngineError, EngineResult};

/// Filename prefix for artifacts shared across a user's sessions
pub const USER_NAMESPACE_PREFIX: &str = "user:";

/// A stored blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl Artifact {
    pub fn new(data: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Address of an artifact (all versions)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub filename: String,
}

impl ArtifactKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            filename: filename.into(),
        }
    }

    /// Whether the artifact is shared across the user's sessions
    pub fn is_user_scoped(&self) -> bool {
        self.filename.starts_with(USER_NAMESPACE_PREFIX)
    }

    /// Object path prefix, without version
    pub fn path(&self) -> String {
        let scope = if self.is_user_scoped() {
            "user"
        } else {
            self.session_id.as_str()
        };
        format!("{}/{}/{}/{}", self.app_name, self.user_id, scope, self.filename)
    }

    /// Object path of a specific version
    pub fn versioned_path(&self, version: u32) -> String {
        format!("{}/{}", self.path(), version)
    }
}

/// Storage for versioned artifacts
#[async_trait]
pub trait ArtifactService: Send + Sync {
    /// Store a new version, returning its number (starting at 0)
    async fn save_artifact(&self, key: &ArtifactKey, artifact: Artifact) -> EngineResult<u32>;

    /// Load a version, or the latest when `version` is `None`
    async fn load_artifact(
        &self,
        key: &ArtifactKey,
        version: Option<u32>,
    ) -> EngineResult<Option<Artifact>>;

    /// Filenames visible to a session, including user-scoped ones
    async fn list_artifact_keys(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> EngineResult<Vec<String>>;

    async fn list_versions(&self, key: &ArtifactKey) -> EngineResult<Vec<u32>>;

    /// Delete all versions
    async fn delete_artifact(&self, key: &ArtifactKey) -> EngineResult<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Ephemeral in-process artifact storage
#[derive(Debug, Default)]
pub struct InMemoryArtifactService {
    artifacts: RwLock<HashMap<String, Vec<Artifact>>>,
}

impl InMemoryArtifactService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactService for InMemoryArtifactService {
    async fn save_artifact(&self, key: &ArtifactKey, artifact: Artifact) -> EngineResult<u32> {
        let mut artifacts = self.artifacts.write().await;
        let versions = artifacts.entry(key.path()).or_default();
        versions.push(artifact);
        let version = u32::try_from(versions.len() - 1)
            .map_err(|_| EngineError::InvalidRequest("too many artifact versions".into()))?;
        tracing::debug!(path = %key.path(), version, "Saved artifact");
        Ok(version)
    }

    async fn load_artifact(
        &self,
        key: &ArtifactKey,
        version: Option<u32>,
    ) -> EngineResult<Option<Artifact>> {
        let artifacts = self.artifacts.read().await;
        let Some(versions) = artifacts.get(&key.path()) else {
            return Ok(None);
        };
        Ok(match version {
            Some(v) => versions.get(v as usize).cloned(),
            None => versions.last().cloned(),
        })
    }

    async fn list_artifact_keys(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> EngineResult<Vec<String>> {
        let session_prefix = format!("{}/{}/{}/", app_name, user_id, session_id);
        let user_prefix = format!("{}/{}/user/", app_name, user_id);

        let artifacts = self.artifacts.read().await;
        let names: BTreeSet<String> = artifacts
            .keys()
            .filter_map(|path| {
                path.strip_prefix(&session_prefix)
                    .or_else(|| path.strip_prefix(&user_prefix))
                    .map(str::to_string)
            })
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn list_versions(&self, key: &ArtifactKey) -> EngineResult<Vec<u32>> {
        let artifacts = self.artifacts.read().await;
        let count = artifacts.get(&key.path()).map_or(0, Vec::len);
        Ok((0..count as u32).collect())
    }

    async fn delete_artifact(&self, key: &ArtifactKey) -> EngineResult<()> {
        self.artifacts.write().await.remove(&key.path());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}
