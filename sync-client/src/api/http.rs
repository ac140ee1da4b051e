//! reqwest implementation of [`PreferencesApi`].

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;
use trailsync_types::{
    AuthUser, DeviceRecord, MapState, MigrateChatRequest, MigrateChatResponse, NavigationState,
    PreferencePatch, PreferenceSet, SyncRequest, SyncResponse,
};

use super::PreferencesApi;
use crate::auth::AuthProvider;
use crate::error::ClientError;

/// HTTP client for the preferences server.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpApi {
    /// Create a client for `base_url` (e.g. `https://example.com/api`).
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn AuthProvider>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, auth)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            auth,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        token: Option<&str>,
    ) -> Result<Response, ClientError> {
        let response = self
            .authorized(request, token)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "api response");

        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            };
            return Err(ClientError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let token = self.auth.token();
        let response = self.execute(request, token.as_deref()).await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ClientError::Network(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Serialization(e.to_string()))
}

#[async_trait]
impl PreferencesApi for HttpApi {
    async fn get_preferences(&self) -> Result<PreferenceSet, ClientError> {
        self.fetch(self.client.get(self.url("/preferences"))).await
    }

    async fn update_preferences(
        &self,
        patch: &PreferencePatch,
    ) -> Result<PreferenceSet, ClientError> {
        self.fetch(self.client.put(self.url("/preferences")).json(patch))
            .await
    }

    async fn update_map_state(&self, map_state: &MapState) -> Result<PreferenceSet, ClientError> {
        self.fetch(
            self.client
                .put(self.url("/preferences/map-state"))
                .json(map_state),
        )
        .await
    }

    async fn update_navigation(
        &self,
        navigation: &NavigationState,
    ) -> Result<PreferenceSet, ClientError> {
        self.fetch(
            self.client
                .put(self.url("/preferences/navigation"))
                .json(navigation),
        )
        .await
    }

    async fn list_devices(&self) -> Result<Vec<DeviceRecord>, ClientError> {
        self.fetch(self.client.get(self.url("/preferences/devices")))
            .await
    }

    async fn register_device(&self, device: &DeviceRecord) -> Result<(), ClientError> {
        let token = self.auth.token();
        let request = self
            .client
            .post(self.url("/preferences/devices"))
            .json(device);
        self.execute(request, token.as_deref()).await?;
        Ok(())
    }

    async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse, ClientError> {
        self.fetch(
            self.client
                .post(self.url("/preferences/sync"))
                .json(request),
        )
        .await
    }

    async fn migrate_chat(
        &self,
        token: &str,
        request: &MigrateChatRequest,
    ) -> Result<MigrateChatResponse, ClientError> {
        let builder = self.client.post(self.url("/auth/migrate-chat")).json(request);
        let response = self.execute(builder, Some(token)).await?;
        decode(response).await
    }

    async fn current_user(&self) -> Result<AuthUser, ClientError> {
        self.fetch(self.client.get(self.url("/auth/me"))).await
    }
}
