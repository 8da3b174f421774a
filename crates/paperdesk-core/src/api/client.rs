//! Request pipeline for the document backend.
//!
//! Every API call goes through [`ApiClient::send`], which attaches the
//! session's bearer token on the way out and classifies failures on the way
//! back. Classification happens here once; callers only ever see an
//! [`ApiError`] variant.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::request::{ApiRequest, ApiResponse, RequestBody};
use super::ApiError;
use crate::auth::SharedSession;
use crate::config::Config;
use crate::navigation::{Navigator, View};
use crate::notify::{NotificationSink, Notice};

/// API client wrapping every exchange with the backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SharedSession,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn NotificationSink>,
    /// Serializes 401 handling so concurrent expiries navigate at most once
    expiry_guard: Arc<Mutex<()>>,
}

impl ApiClient {
    pub fn new(
        config: &Config,
        session: SharedSession,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
            navigator,
            notifier,
            expiry_guard: Arc::new(Mutex::new(())),
        })
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request through the pipeline.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        match self.dispatch(&request).await {
            Ok(response) => Ok(response),
            Err(err) => Err(self.handle_failure(&request, err).await),
        }
    }

    /// Send a request and decode the success body as JSON.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.send(request.clone()).await?;
        match response.json() {
            Ok(value) => Ok(value),
            Err(err) => Err(self.handle_failure(&request, err).await),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send_json(ApiRequest::post(path).json(body)?).await
    }

    /// Egress and transport: attach the credential, send, classify the status.
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url(&request.path);
        let mut builder = self.client.request(request.method.clone(), &url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
        };
        if let Some(token) = self.session.token().await {
            builder = builder.bearer_auth(token);
        }

        debug!(method = %request.method, path = %request.path, "Sending request");

        let response = builder.send().await.map_err(|e| {
            debug!(error = %e, path = %request.path, "No response received");
            ApiError::from_transport(&e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ApiError::from_transport(&e))?;

        if status.is_success() {
            Ok(ApiResponse { status, body })
        } else {
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Ingress side effects for a classified failure.
    async fn handle_failure(&self, request: &ApiRequest, err: ApiError) -> ApiError {
        if request.suppress_global_handling {
            debug!(path = %request.path, category = %err.category(), "Failure returned to caller unhandled");
            return err;
        }

        warn!(
            method = %request.method,
            path = %request.path,
            category = %err.category(),
            status = ?err.status(),
            "Request failed"
        );

        if err.is_unauthenticated() {
            self.expire_session().await;
        }

        self.notifier.notify(Notice::from_error(&err));
        err
    }

    /// Log out after a 401 and send the user to the login view.
    async fn expire_session(&self) {
        let _guard = self.expiry_guard.lock().await;
        if self.session.clear().await {
            info!("Session expired, logged out");
        }
        if self.navigator.current_view() != View::Login {
            self.navigator.go_to_login();
        }
    }
}
