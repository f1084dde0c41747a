//! HTTP client for the auth REST API.
//!
//! The server keeps the session in cookies, so every request goes through
//! one shared cookie jar. The same jar feeds the realtime handshake through
//! [`SessionCookies`].

use std::sync::Arc;

use aeiouly_shared::{
    join_url, ApiError, CurrentUser, GoogleLoginRequest, LoginRequest, TokenResponse,
    ACCESS_TOKEN_COOKIE, API_V1_PREFIX,
};
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::auth_session::SessionProbe;
use crate::ws::SessionCookies;

/// HTTP client for the aeiouly auth endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    jar: Arc<Jar>,
    base_url: String,
    api_prefix: String,
}

impl ApiClient {
    /// Create a client for the API at `base_url` (an http(s) origin).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            jar,
            base_url: base_url.into(),
            api_prefix: API_V1_PREFIX.to_string(),
        })
    }

    /// Set the prefix of the versioned routes (default `/api/v1`)
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&join_url(&self.base_url, &self.api_prefix), path)
    }

    async fn send<TRes: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<TRes, ApiError> {
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        if text.is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }

    /// GET a JSON resource under the API prefix
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        self.send(self.client.get(self.url(path))).await
    }

    /// POST a JSON body under the API prefix
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    /// POST without a body; the session cookies carry everything
    async fn post_empty<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        self.send(self.client.post(self.url(path))).await
    }

    // --- Auth ---

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.post_json("/auth/login", &body).await
    }

    /// Exchange a Google Identity Services credential for a session
    pub async fn google_login(&self, credential: &str) -> Result<TokenResponse, ApiError> {
        let body = GoogleLoginRequest {
            credential: credential.to_string(),
        };
        self.post_json("/auth/google", &body).await
    }

    /// Rotate the access token using the refresh-token cookie
    pub async fn refresh(&self) -> Result<TokenResponse, ApiError> {
        self.post_empty("/auth/refresh").await
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let _: serde_json::Value = self.post_empty("/auth/logout").await?;
        Ok(())
    }

    pub async fn me(&self) -> Result<CurrentUser, ApiError> {
        self.get_json("/auth/me").await
    }

    /// Whether the jar holds an access-token cookie for the API origin
    pub fn has_session_cookie(&self) -> bool {
        self.cookie_header(&self.base_url).is_some_and(|header| {
            header
                .split(';')
                .filter_map(|pair| pair.trim().split_once('='))
                .any(|(name, value)| name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        })
    }
}

impl SessionCookies for ApiClient {
    fn cookie_header(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let header = self.jar.cookies(&url)?;
        header.to_str().ok().map(str::to_string)
    }
}

#[async_trait]
impl SessionProbe for ApiClient {
    /// `GET /auth/me`, retried once after a token refresh when the access
    /// token has expired but the refresh token is still good.
    async fn check_session(&self) -> Result<CurrentUser, ApiError> {
        match self.me().await {
            Err(e) if e.is_unauthorized() => {
                crate::log_debug!("session probe unauthorized, trying token refresh");
                self.refresh().await?;
                self.me().await
            }
            other => other,
        }
    }
}
