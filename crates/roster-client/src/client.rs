//! Shared HTTP plumbing: URLs, headers, status handling and envelope decoding.

use std::sync::Arc;

use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use roster_core::envelope::{self, ApiEnvelope};
use roster_core::resource::ApiBase;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{AuthSession, AuthStore};
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::guard::UnauthorizedGuard;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// REST client for the personnel API.
pub struct ApiClient {
    http: Client,
    config: ApiConfig,
    auth: Arc<AuthStore>,
    guard: Arc<UnauthorizedGuard>,
}

impl ApiClient {
    pub fn new(
        config: ApiConfig,
        auth: Arc<AuthStore>,
        guard: Arc<UnauthorizedGuard>,
    ) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ApiError::Network)?;
        Ok(Self {
            http,
            config,
            auth,
            guard,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn guard(&self) -> &UnauthorizedGuard {
        &self.guard
    }

    pub fn url(&self, api: ApiBase, path: &str) -> String {
        format!("{}{}", self.config.base(api), path.trim_start_matches('/'))
    }

    /// Request with the standard headers: bearer token when logged in,
    /// JSON accept, and a fresh request id.
    pub fn request(&self, method: Method, api: ApiBase, path: &str) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, self.url(api, path))
            .header(ACCEPT, "application/json")
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());
        if let Some(token) = self.auth.token() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Send and decode the envelope. Non-2xx statuses become errors carrying
    /// the server's message; a 401 also goes through the unauthorized guard.
    pub async fn send(&self, builder: RequestBuilder) -> ApiResult<ApiEnvelope> {
        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, "request failed");
            ApiError::Network(e)
        })?;
        let status = response.status();
        let url = response.url().path().to_string();
        let bytes = response.bytes().await?;
        debug!(%status, path = %url, len = bytes.len(), "response");

        let blank = bytes.iter().all(u8::is_ascii_whitespace);
        let body: Option<Value> = if blank {
            None
        } else {
            serde_json::from_slice(&bytes).ok()
        };

        if status == StatusCode::UNAUTHORIZED {
            self.guard.handle_unauthorized(&self.auth);
            return Err(ApiError::Unauthorized {
                message: body.as_ref().and_then(body_message),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: body.as_ref().and_then(body_message),
            });
        }

        match body {
            Some(value) => Ok(ApiEnvelope::decode(value)),
            None if blank => Ok(ApiEnvelope::Success(Value::Null)),
            None => Err(ApiError::UnexpectedFormat(format!("non-JSON body from {url}"))),
        }
    }

    pub async fn get_list<T: DeserializeOwned>(&self, api: ApiBase, path: &str) -> ApiResult<Vec<T>> {
        let envelope = self.send(self.request(Method::GET, api, path)).await?;
        Ok(envelope.into_list()?)
    }

    /// List fetch that drops rows failing to decode rather than the whole list.
    pub async fn get_list_lossy<T: DeserializeOwned>(
        &self,
        api: ApiBase,
        path: &str,
    ) -> ApiResult<Vec<T>> {
        let envelope = self.send(self.request(Method::GET, api, path)).await?;
        Ok(envelope.into_list_lossy()?)
    }

    pub async fn get_record<T: DeserializeOwned>(&self, api: ApiBase, path: &str) -> ApiResult<T> {
        let envelope = self.send(self.request(Method::GET, api, path)).await?;
        Ok(envelope.into_record()?)
    }

    /// List fetch for screens that must keep rendering: any failure yields
    /// an empty list and is reported to `on_error`.
    pub async fn fetch_list_or_empty<T, F>(&self, api: ApiBase, path: &str, on_error: F) -> Vec<T>
    where
        T: DeserializeOwned,
        F: FnOnce(&ApiError),
    {
        match self.get_list(api, path).await {
            Ok(items) => items,
            Err(e) => {
                warn!(path, error = %e, "list fetch failed");
                on_error(&e);
                Vec::new()
            }
        }
    }

    pub async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        api: ApiBase,
        path: &str,
        body: &B,
    ) -> ApiResult<Value> {
        let envelope = self.send(self.request(method, api, path).json(body)).await?;
        Ok(envelope.into_payload()?)
    }

    /// Password login. Stores the session and re-arms the unauthorized guard.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<AuthSession> {
        let body = serde_json::json!({ "username": username, "password": password });
        let data = self
            .send_json(Method::POST, ApiBase::Main, "auth/login", &body)
            .await?;
        let token = data
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::UnexpectedFormat("login response has no token".into()))?;
        let user = data.get("user").cloned().unwrap_or(Value::Null);
        let session = AuthSession::new(token).with_user(&user);
        self.adopt_session(session.clone())?;
        Ok(session)
    }

    pub fn adopt_session(&self, session: AuthSession) -> ApiResult<()> {
        self.auth.save(session)?;
        self.guard.rearm();
        tracing::info!("logged in");
        Ok(())
    }

    pub fn logout(&self) {
        self.auth.clear();
    }
}

fn body_message(body: &Value) -> Option<String> {
    body.as_object().and_then(envelope::extract_message)
}
