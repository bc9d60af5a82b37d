//! GitHub contents-API implementation of [`RemoteStore`].
//!
//! The snapshot lives as one base64-encoded JSON file at a fixed
//! repo/path/branch triple. The file's blob SHA is the opaque version token:
//! a PUT carrying a stale SHA is rejected by GitHub with 409, which maps to
//! [`SyncError::Conflict`].

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::SyncError;
use crate::model::{ProgressSnapshot, RemoteMeta};

use super::{RemoteSnapshot, RemoteStore};

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// `owner/name`.
    pub repo: String,
    /// Path of the snapshot file within the repo.
    pub path: String,
    pub branch: String,
    pub api_base: String,
    /// Device label written into the `_meta` envelope on push.
    pub device: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            repo: "omarclaw1420/plantpro-quest".to_string(),
            path: "data/plantpro-progress.json".to_string(),
            branch: "main".to_string(),
            api_base: "https://api.github.com/repos".to_string(),
            device: "plantpro-quest-core".to_string(),
        }
    }
}

pub struct GitHubClient {
    http: reqwest::Client,
    config: GitHubConfig,
}

#[derive(Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

#[derive(Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Deserialize)]
struct PutContent {
    sha: String,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self, SyncError> {
        // GitHub rejects API requests without a User-Agent header.
        let http = reqwest::Client::builder()
            .user_agent(concat!("plantpro-quest/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| SyncError::transport(err.to_string()))?;
        Ok(Self { http, config })
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/{}/contents/{}",
            self.config.api_base, self.config.repo, self.config.path
        )
    }
}

#[async_trait]
impl RemoteStore for GitHubClient {
    async fn fetch(&self, token: &str) -> Result<Option<RemoteSnapshot>, SyncError> {
        let url = format!("{}?ref={}", self.contents_url(), self.config.branch);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("token {token}"))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .map_err(|err| SyncError::transport(err.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // File doesn't exist yet: first-time user.
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: ContentsResponse = response
            .json()
            .await
            .map_err(|err| SyncError::transport(err.to_string()))?;

        // The contents API line-wraps its base64 payload.
        let stripped: String = body.content.split_whitespace().collect();
        let decoded = BASE64
            .decode(stripped.as_bytes())
            .map_err(|err| SyncError::transport(format!("invalid remote encoding: {err}")))?;
        let value: Value = serde_json::from_slice(&decoded)
            .map_err(|err| SyncError::transport(format!("invalid remote snapshot: {err}")))?;

        let meta = value
            .get("_meta")
            .and_then(|m| serde_json::from_value(m.clone()).ok());
        let content = ProgressSnapshot::merge_with_defaults(&value);

        Ok(Some(RemoteSnapshot {
            content,
            meta,
            version: body.sha,
        }))
    }

    async fn push(
        &self,
        token: &str,
        snapshot: &ProgressSnapshot,
        expected_version: Option<&str>,
    ) -> Result<String, SyncError> {
        let now = Utc::now();
        let mut payload = serde_json::to_value(snapshot)
            .map_err(|err| SyncError::transport(err.to_string()))?;
        payload["_meta"] = serde_json::to_value(RemoteMeta::new(
            now.timestamp_millis(),
            self.config.device.clone(),
        ))
        .map_err(|err| SyncError::transport(err.to_string()))?;

        let pretty = serde_json::to_string_pretty(&payload)
            .map_err(|err| SyncError::transport(err.to_string()))?;
        let mut body = json!({
            "message": format!("Update progress: {}", now.to_rfc3339()),
            "content": BASE64.encode(pretty.as_bytes()),
            "branch": self.config.branch,
        });
        if let Some(sha) = expected_version {
            body["sha"] = json!(sha);
        }

        let response = self
            .http
            .put(self.contents_url())
            .header("Authorization", format!("token {token}"))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&body)
            .send()
            .await
            .map_err(|err| SyncError::transport(err.to_string()))?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(SyncError::Conflict);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let put: PutResponse = response
            .json()
            .await
            .map_err(|err| SyncError::transport(err.to_string()))?;
        Ok(put.content.sha)
    }
}

async fn status_error(response: reqwest::Response) -> SyncError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    SyncError::transport(format!("GitHub API error: {status} - {body}"))
}
