//! HTTP client for the application backend.
//!
//! The backend is a set of edge functions behind one base URL. Every
//! request carries the project's anon key as `apikey`; the bearer is the
//! signed-in user's access token when there is one, else the anon key.

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::profile::{ProfileFetcher, ProfileResponse};
use crate::bootstrap::{InitBackend, InitResponse};
use crate::config::BackendConfig;

/// Path of the one-time backend initialization endpoint.
const INIT_PATH: &str = "/init";

/// Backend HTTP client.
pub struct BackendClient {
    config: BackendConfig,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> anyhow::Result<Self> {
        if config.url.trim().is_empty() {
            anyhow::bail!("Backend URL is not configured");
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Full URL for a backend path.
    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn auth_headers(&self, bearer: Option<&str>) -> Vec<(&str, String)> {
        let mut headers = Vec::with_capacity(2);
        if let Some(key) = &self.config.anon_key {
            headers.push(("apikey", key.clone()));
        }
        if let Some(token) = bearer.or(self.config.anon_key.as_deref()) {
            headers.push(("Authorization", format!("Bearer {token}")));
        }
        headers
    }

    // ── Requests ─────────────────────────────────────────────

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Option<&str>,
    ) -> anyhow::Result<T> {
        let mut request = self.http.get(self.endpoint(path));
        for (key, value) in self.auth_headers(bearer) {
            request = request.header(key, value);
        }

        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET {path} failed ({status}): {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("GET {path} returned malformed JSON"))
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> anyhow::Result<T> {
        let mut request = self.http.post(self.endpoint(path)).json(body);
        for (key, value) in self.auth_headers(bearer) {
            request = request.header(key, value);
        }

        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("POST {path} failed ({status}): {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("POST {path} returned malformed JSON"))
    }
}

#[async_trait]
impl ProfileFetcher for BackendClient {
    async fn fetch_profile(&self, bearer_token: &str) -> anyhow::Result<ProfileResponse> {
        self.get_json(&self.config.profile_path, Some(bearer_token))
            .await
    }
}

#[async_trait]
impl InitBackend for BackendClient {
    async fn initialize(&self) -> anyhow::Result<InitResponse> {
        self.post_json(INIT_PATH, &serde_json::json!({}), None).await
    }
}
