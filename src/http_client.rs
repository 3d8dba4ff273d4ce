use anyhow::{Context, Result};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{RefreshCoordinator, RefreshError, RefreshOutcome, RefreshResponse, RefreshState, TokenStore};
use crate::config::Config;
use crate::error::{message_from_body, ApiError};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 6000;

/// All API routes live under this prefix of the backend URL
const API_PREFIX: &str = "/api";

const REFRESH_PATH: &str = "/refresh-token";

/// Per-request overrides for headers and timeout
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,

    /// Surface a 401 directly instead of refreshing the token
    pub skip_refresh: bool,
}

impl RequestOptions {
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_refresh(mut self) -> Self {
        self.skip_refresh = true;
        self
    }
}

/// File sent as one part of a `multipart/form-data` body
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Form field name
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl FilePart {
    fn to_form(&self) -> Result<Form, ApiError> {
        let part = Part::bytes(self.bytes.clone())
            .file_name(self.file_name.clone())
            .mime_str(&self.mime)
            .map_err(|e| ApiError::Validation(format!("Invalid content type {}: {}", self.mime, e)))?;
        Ok(Form::new().part(self.field.clone(), part))
    }
}

enum Body {
    Json(Value),

    /// Kept as raw bytes so a replay can rebuild the form
    Multipart(FilePart),
}

/// A request travelling through the auth pipeline
struct Outgoing {
    method: Method,
    path: String,
    body: Option<Body>,
    options: RequestOptions,

    /// Set once the request has been replayed after a refresh
    retried: bool,

    /// Token to attach on replay instead of reading the store
    bearer: Option<String>,
}

/// HTTP client for the TurboLink API
///
/// Attaches the in-memory access token to every request. A 401 triggers a
/// single shared refresh and a transparent replay; a second 401 on the same
/// request, a 403, network errors and every other status reach the caller
/// unchanged. Clone is cheap and all clones share the token and cookie jar.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    /// Shared HTTP client; its cookie jar carries the refresh cookie
    client: Client,

    /// `<backend>/api`
    base_url: String,

    refresh_url: String,

    tokens: TokenStore,

    coordinator: RefreshCoordinator,
}

impl ApiClient {
    /// Create a new API client for the given backend
    pub fn new(backend_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let root = backend_url.trim_end_matches('/');
        let base_url = format!("{}{}", root, API_PREFIX);
        let refresh_url = format!("{}{}", base_url, REFRESH_PATH);

        let tokens = TokenStore::new();
        let coordinator = RefreshCoordinator::new(tokens.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                base_url,
                refresh_url,
                tokens,
                coordinator,
            }),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.backend_url,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    /// Replace the in-memory access token used by subsequent requests
    pub fn set_auth_token(&self, token: Option<String>) {
        tracing::debug!(present = token.is_some(), "Access token updated");
        self.inner.tokens.set(token);
    }

    pub fn auth_token(&self) -> Option<String> {
        self.inner.tokens.get()
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.inner.coordinator.state()
    }

    /// Number of refresh calls issued so far
    pub fn refresh_count(&self) -> u64 {
        self.inner.coordinator.refresh_count()
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Send a request through the auth pipeline
    pub async fn request<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<Response, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ApiError::Validation(format!("Request body is not serializable: {}", e)))?;

        let retried = options.skip_refresh;
        self.dispatch(Outgoing {
            method,
            path: path.to_string(),
            body: body.map(Body::Json),
            options,
            retried,
            bearer: None,
        })
        .await
    }

    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        self.request::<Value>(Method::GET, path, None, RequestOptions::default())
            .await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, ApiError> {
        self.request(Method::POST, path, Some(body), RequestOptions::default())
            .await
    }

    /// POST without a body
    pub async fn post_empty(&self, path: &str) -> Result<Response, ApiError> {
        self.request::<Value>(Method::POST, path, None, RequestOptions::default())
            .await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, ApiError> {
        self.request(Method::PUT, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, ApiError> {
        self.request(Method::PATCH, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, ApiError> {
        self.request::<Value>(Method::DELETE, path, None, RequestOptions::default())
            .await
    }

    /// POST a file as `multipart/form-data`
    pub async fn post_multipart(&self, path: &str, file: FilePart) -> Result<Response, ApiError> {
        self.dispatch(Outgoing {
            method: Method::POST,
            path: path.to_string(),
            body: Some(Body::Multipart(file)),
            options: RequestOptions::default(),
            retried: false,
            bearer: None,
        })
        .await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        decode(self.get(path).await?).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        decode(self.post(path, body).await?).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        decode(self.put(path, body).await?).await
    }

    /// Mint an access token from the refresh cookie alone
    ///
    /// Used to resume a session at startup. Shares the single-flight guard
    /// with 401 recovery; returns the current token if one is already set.
    pub async fn refresh_session(&self) -> Result<String, ApiError> {
        self.recover(None).await
    }

    async fn dispatch(&self, mut outgoing: Outgoing) -> Result<Response, ApiError> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();

        loop {
            let token = outgoing.bearer.take().or_else(|| self.inner.tokens.get());
            let response = self.send(&outgoing, token.as_deref(), &request_id).await?;
            let status = response.status();

            if status.is_success() {
                tracing::debug!(request_id = %request_id, status = %status, "Request successful");
                return Ok(response);
            }

            match status {
                // Authorization failure, not an expired token: never refresh
                StatusCode::FORBIDDEN => {}

                StatusCode::UNAUTHORIZED if !outgoing.retried => {
                    tracing::debug!(request_id = %request_id, path = %outgoing.path, "Received 401, recovering access token");
                    outgoing.retried = true;
                    let fresh = self.recover(token.as_deref()).await?;
                    outgoing.bearer = Some(fresh);
                    continue;
                }

                _ => {}
            }

            tracing::warn!(
                request_id = %request_id,
                method = %outgoing.method,
                path = %outgoing.path,
                status = status.as_u16(),
                retried = outgoing.retried,
                "Received error response"
            );
            return Err(ApiError::from_response(response).await);
        }
    }

    async fn send(
        &self,
        outgoing: &Outgoing,
        token: Option<&str>,
        request_id: &str,
    ) -> Result<Response, ApiError> {
        let url = self.url(&outgoing.path);

        let mut builder = self.inner.client.request(outgoing.method.clone(), &url);

        // reqwest sets the multipart content type along with the boundary
        if !matches!(outgoing.body, Some(Body::Multipart(_))) {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        builder = builder.headers(outgoing.options.headers.clone());

        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(timeout) = outgoing.options.timeout {
            builder = builder.timeout(timeout);
        }
        match outgoing.body {
            Some(Body::Json(ref body)) => builder = builder.json(body),
            Some(Body::Multipart(ref file)) => builder = builder.multipart(file.to_form()?),
            None => {}
        }

        tracing::debug!(
            request_id = %request_id,
            method = %outgoing.method,
            url = %url,
            authenticated = token.is_some(),
            retried = outgoing.retried,
            "Sending HTTP request"
        );

        builder.send().await.map_err(|e| {
            tracing::warn!(
                request_id = %request_id,
                error_kind = error_kind(&e),
                error = %e,
                url = %url,
                "HTTP request error"
            );
            ApiError::Transport(e)
        })
    }

    async fn recover(&self, sent_with: Option<&str>) -> Result<String, ApiError> {
        let client = self.inner.client.clone();
        let url = self.inner.refresh_url.clone();

        self.inner
            .coordinator
            .recover(sent_with, move || request_new_token(client, url))
            .await
            .map_err(ApiError::Refresh)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'))
    }
}

/// Call the refresh endpoint; the refresh cookie travels in the cookie jar
async fn request_new_token(client: Client, url: String) -> RefreshOutcome {
    let response = client
        .post(&url)
        .header(header::CONTENT_TYPE, "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RefreshError::Rejected {
            status: status.as_u16(),
            message: message_from_body(&body),
        });
    }

    let data: RefreshResponse = response.json().await?;
    data.access_token
        .filter(|t| !t.is_empty())
        .ok_or(RefreshError::MissingToken)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response
        .json()
        .await
        .map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// Categorize a transport error for logging
fn error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    }
}
