//! Managed artifact service client
//!
//! Stores each artifact version as one object in a storage bucket, named
//! `{app}/{user}/{session|user}/{filename}/{version}`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use super::artifact::{Artifact, ArtifactKey, ArtifactService};
use super::auth::TokenSource;
use crate::core::{EngineError, EngineResult};

const STORAGE_API: &str = "https://storage.googleapis.com/storage/v1";
const UPLOAD_API: &str = "https://storage.googleapis.com/upload/storage/v1";

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectMeta>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

/// Parse `{prefix}{filename}/{version}` into (filename, version)
fn split_versioned(rest: &str) -> Option<(&str, u32)> {
    let (filename, version) = rest.rsplit_once('/')?;
    Some((filename, version.parse().ok()?))
}

/// Artifact service backed by a storage bucket
#[derive(Debug, Clone)]
pub struct GcsArtifactService {
    client: Client,
    bucket: String,
    tokens: TokenSource,
}

impl GcsArtifactService {
    pub fn new(bucket: impl Into<String>, tokens: TokenSource) -> Self {
        Self {
            client: Client::new(),
            bucket: bucket.into(),
            tokens,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// URL of a single object (name percent-encoded as one path segment)
    pub fn object_url(&self, name: &str) -> EngineResult<Url> {
        let mut url = Url::parse(STORAGE_API)
            .map_err(|e| EngineError::InvalidConfig(format!("storage URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| EngineError::InvalidConfig("storage URL cannot be a base".into()))?
            .extend(["b", self.bucket.as_str(), "o", name]);
        Ok(url)
    }

    fn list_url(&self) -> String {
        format!("{}/b/{}/o", STORAGE_API, self.bucket)
    }

    fn upload_url(&self) -> String {
        format!("{}/b/{}/o", UPLOAD_API, self.bucket)
    }

    /// All object names under a prefix
    async fn list_objects(&self, prefix: &str) -> EngineResult<Vec<String>> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.tokens.bearer().await?;
            let mut req = self
                .client
                .get(self.list_url())
                .bearer_auth(token)
                .query(&[("prefix", prefix)]);
            if let Some(page) = &page_token {
                req = req.query(&[("pageToken", page)]);
            }

            let list: ObjectList = req.send().await?.error_for_status()?.json().await?;
            names.extend(list.items.into_iter().map(|o| o.name));

            match list.next_page_token.filter(|t| !t.is_empty()) {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }

        Ok(names)
    }
}

#[async_trait]
impl ArtifactService for GcsArtifactService {
    async fn save_artifact(&self, key: &ArtifactKey, artifact: Artifact) -> EngineResult<u32> {
        let version = self
            .list_versions(key)
            .await?
            .into_iter()
            .max()
            .map_or(0, |v| v + 1);
        let name = key.versioned_path(version);

        let token = self.tokens.bearer().await?;
        self.client
            .post(self.upload_url())
            .bearer_auth(token)
            .query(&[("uploadType", "media"), ("name", name.as_str())])
            .header(CONTENT_TYPE, artifact.mime_type)
            .body(artifact.data)
            .send()
            .await?
            .error_for_status()?;

        tracing::debug!(bucket = %self.bucket, object = %name, "Uploaded artifact");
        Ok(version)
    }

    async fn load_artifact(
        &self,
        key: &ArtifactKey,
        version: Option<u32>,
    ) -> EngineResult<Option<Artifact>> {
        let version = match version {
            Some(v) => v,
            None => match self.list_versions(key).await?.into_iter().max() {
                Some(v) => v,
                None => return Ok(None),
            },
        };

        let mut url = self.object_url(&key.versioned_path(version))?;
        url.query_pairs_mut().append_pair("alt", "media");

        let token = self.tokens.bearer().await?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        let data = response.bytes().await?.to_vec();

        Ok(Some(Artifact { data, mime_type }))
    }

    async fn list_artifact_keys(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> EngineResult<Vec<String>> {
        let mut filenames = BTreeSet::new();

        for prefix in [
            format!("{}/{}/{}/", app_name, user_id, session_id),
            format!("{}/{}/user/", app_name, user_id),
        ] {
            for name in self.list_objects(&prefix).await? {
                if let Some((filename, _)) = name
                    .strip_prefix(prefix.as_str())
                    .and_then(split_versioned)
                {
                    filenames.insert(filename.to_string());
                }
            }
        }

        Ok(filenames.into_iter().collect())
    }

    async fn list_versions(&self, key: &ArtifactKey) -> EngineResult<Vec<u32>> {
        let prefix = format!("{}/", key.path());
        let mut versions: Vec<u32> = self
            .list_objects(&prefix)
            .await?
            .iter()
            .filter_map(|name| name.strip_prefix(prefix.as_str())?.parse().ok())
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    async fn delete_artifact(&self, key: &ArtifactKey) -> EngineResult<()> {
        for version in self.list_versions(key).await? {
            let url = self.object_url(&key.versioned_path(version))?;
            let token = self.tokens.bearer().await?;
            let response = self.client.delete(url).bearer_auth(token).send().await?;
            if response.status() != StatusCode::NOT_FOUND {
                response.error_for_status()?;
            }
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "gcs"
    }
}
