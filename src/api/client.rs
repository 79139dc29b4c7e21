//! Authenticated HTTP pipeline to the school backend.
//!
//! Each request goes through two interception points:
//!
//! 1. **Before dispatch** ([`ApiClient::authorize`]): the stored token is read;
//!    a malformed one is regenerated from the stored identity and written back.
//!    Whatever token is then available is sent as `Authorization: Bearer`.
//! 2. **After a 401/403**: when the body points at the token (`JWT`/`token` by
//!    default) and an identity is stored, a new token is generated and the
//!    request is sent again, once. Otherwise, or when that single retry is
//!    rejected as well, the session is cleared and a delayed navigation to the
//!    login route is scheduled.
//!
//! Other statuses are returned untouched as [`ApiError::Http`]. Concurrent
//! requests may regenerate the token independently; the writes are not
//! coordinated. Token material is never logged.

use super::errors::ApiError;
use crate::config::AppConfig;
use crate::navigation::Navigator;
use crate::session::codec::{self, SessionToken};
use crate::session::manager::{clear_session, read_key, regenerate_token};
use crate::session::{SessionStore, TOKEN_KEY};
use crate::APP_USER_AGENT;
use regex::Regex;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    mem,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use ulid::Ulid;
use url::Url;

/// Default request timeout applied to every request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Retries granted to a request rejected for a token problem.
pub const MAX_AUTH_RETRIES: u8 = 1;
/// Correlates an original attempt with its retry in backend logs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Maximum number of error body characters surfaced to callers.
const MAX_ERROR_CHARS: usize = 200;

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub login_route: String,
    pub redirect_delay: Duration,
    pub token_failure: Regex,
}

impl PipelineConfig {
    /// # Errors
    /// Returns an error if `token_failure_pattern` is not a valid regex.
    pub fn new(
        login_route: &str,
        redirect_delay: Duration,
        token_failure_pattern: &str,
    ) -> Result<Self, ApiError> {
        let token_failure = Regex::new(token_failure_pattern).map_err(|err| {
            ApiError::Config(format!("invalid token failure pattern: {err}"))
        })?;
        Ok(Self {
            login_route: login_route.to_string(),
            redirect_delay,
            token_failure,
        })
    }

    /// # Errors
    /// Returns an error if the configured pattern is not a valid regex.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ApiError> {
        Self::new(
            &config.login_route,
            config.redirect_delay,
            &config.auth_failure_pattern,
        )
    }
}

/// A request as the caller describes it; the pipeline adds the headers.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    /// # Errors
    /// Returns an error if the body cannot be encoded as JSON.
    pub fn post<B: Serialize>(path: &str, body: &B) -> Result<Self, ApiError> {
        Self::new(Method::POST, path).with_body(body)
    }

    /// # Errors
    /// Returns an error if the body cannot be encoded as JSON.
    pub fn with_body<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|err| ApiError::Serialization(format!("Failed to encode request: {err}")))?;
        self.body = Some(body);
        Ok(self)
    }

    #[must_use]
    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// # Errors
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|err| ApiError::Parse(format!("Failed to decode response: {err}")))
    }
}

/// Per-request state carried across the original attempt and its retry.
#[derive(Debug)]
struct RequestContext {
    request_id: Ulid,
    attempt: u8,
    retries_left: u8,
}

impl RequestContext {
    fn new() -> Self {
        Self {
            request_id: Ulid::new(),
            attempt: 0,
            retries_left: MAX_AUTH_RETRIES,
        }
    }
}

enum Interception {
    Deliver(ApiResponse),
    Retry(SessionToken),
    Reject(ApiError),
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    store: SessionStore,
    navigator: Arc<dyn Navigator>,
    config: Arc<PipelineConfig>,
    redirects: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ApiClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        store: SessionStore,
        navigator: Arc<dyn Navigator>,
        config: PipelineConfig,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| ApiError::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url,
            store,
            navigator,
            config: Arc::new(config),
            redirects: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// # Errors
    /// Returns an error if the pipeline configuration or HTTP client is invalid.
    pub fn from_config(
        config: &AppConfig,
        store: SessionStore,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        Self::new(
            config.api_base_url.clone(),
            store,
            navigator,
            PipelineConfig::from_app_config(config)?,
        )
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetches JSON from `path`.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body does not decode.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(&ApiRequest::get(path)).await?.json()
    }

    /// Posts `body` as JSON and decodes the JSON response.
    ///
    /// # Errors
    /// Returns an error if the request fails or the body does not decode.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(&ApiRequest::post(path, body)?).await?.json()
    }

    /// Runs `request` through the pipeline.
    ///
    /// # Errors
    /// Returns [`ApiError::Http`] for any non-success status that was not
    /// recovered, and network/timeout errors as they occur.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut context = RequestContext::new();
        let mut bearer = self.authorize();

        loop {
            context.attempt += 1;
            let response = self.dispatch(request, bearer.as_ref(), &context).await?;
            match self.intercept(response, &mut context).await {
                Interception::Deliver(response) => return Ok(response),
                Interception::Reject(err) => return Err(err),
                Interception::Retry(token) => bearer = Some(token),
            }
        }
    }

    /// Request interceptor: the token to attach, regenerating and persisting
    /// it first when the stored one is malformed and an identity is stored.
    /// A malformed token with no identity to rebuild from is sent as is.
    #[must_use]
    pub fn authorize(&self) -> Option<SessionToken> {
        let Some(token) = read_key(&self.store, TOKEN_KEY) else {
            warn!("no token available for request");
            return None;
        };

        if codec::is_well_formed(Some(&token)) {
            return Some(SessionToken::new(token));
        }

        debug!("stored token is malformed, regenerating before dispatch");
        Some(regenerate_token(&self.store).unwrap_or_else(|| SessionToken::new(token)))
    }

    /// Waits for every scheduled login redirect to fire. Redirects cannot be
    /// cancelled; this only lets a short-lived caller observe them.
    pub async fn settle(&self) {
        let pending = {
            let mut redirects = self.redirects.lock().unwrap_or_else(PoisonError::into_inner);
            mem::take(&mut *redirects)
        };
        for handle in pending {
            if let Err(err) = handle.await {
                error!("login redirect task failed: {err}");
            }
        }
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&SessionToken>,
        context: &RequestContext,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.url_for(&request.path)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(REQUEST_ID_HEADER, context.request_id.to_string());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token.expose());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(
            request_id = %context.request_id,
            attempt = context.attempt,
            authorized = bearer.is_some(),
            "dispatching request"
        );
        builder.send().await.map_err(map_request_error)
    }

    /// Response interceptor.
    async fn intercept(
        &self,
        response: reqwest::Response,
        context: &mut RequestContext,
    ) -> Interception {
        let status = response.status();
        let auth_failure = status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN;
        let body = match response.text().await {
            Ok(body) => body,
            // An unreadable 401/403 still ends or recovers the session.
            Err(err) if auth_failure => {
                warn!(status = status.as_u16(), "failed to read rejection body: {err}");
                String::new()
            }
            Err(err) => return Interception::Reject(map_request_error(err)),
        };

        if status.is_success() {
            debug!(status = status.as_u16(), "response received");
            return Interception::Deliver(ApiResponse { status, body });
        }

        if !auth_failure {
            debug!(status = status.as_u16(), "passing error response through");
            return Interception::Reject(http_error(status, &body));
        }

        self.recover(status, &body, context)
    }

    fn recover(&self, status: StatusCode, body: &str, context: &mut RequestContext) -> Interception {
        warn!(
            status = status.as_u16(),
            request_id = %context.request_id,
            attempt = context.attempt,
            "authentication rejected by backend"
        );

        if context.retries_left > 0 && self.config.token_failure.is_match(body) {
            if let Some(token) = regenerate_token(&self.store) {
                context.retries_left -= 1;
                info!(request_id = %context.request_id, "token failure detected, retrying with a regenerated token");
                return Interception::Retry(token);
            }
        }

        self.end_session();
        Interception::Reject(http_error(status, body))
    }

    /// Clears the session and, unless the user is already on the login route,
    /// schedules one delayed navigation there.
    fn end_session(&self) {
        clear_session(&self.store);

        let current = self.navigator.current_path();
        if current.contains(&self.config.login_route) {
            info!("session cleared, already on the login route");
            return;
        }

        info!(from = %current, "session cleared, redirecting to login");
        let navigator = Arc::clone(&self.navigator);
        let login_route = self.config.login_route.clone();
        let delay = self.config.redirect_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            navigator.navigate(&login_route);
        });

        let mut redirects = self.redirects.lock().unwrap_or_else(PoisonError::into_inner);
        redirects.retain(|pending| !pending.is_finished());
        redirects.push(handle);
    }

    fn url_for(&self, path: &str) -> Result<Url, ApiError> {
        let url = build_url_with_base(self.base_url.as_str(), path);
        Url::parse(&url).map_err(|err| ApiError::Config(format!("Invalid request URL {url}: {err}")))
    }
}

/// Joins the base URL and a path with exactly one slash between them.
fn build_url_with_base(base_url: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim();

    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

fn map_request_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout("Request timed out. Please try again.".to_string())
    } else {
        ApiError::Network(format!("Unable to reach the server: {err}"))
    }
}

fn http_error(status: StatusCode, body: &str) -> ApiError {
    ApiError::Http {
        status: status.as_u16(),
        message: sanitize_body(body),
    }
}

/// Trims and truncates an error body for callers.
fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Request failed.".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}
