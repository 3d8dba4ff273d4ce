use reqwest::header::{HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::types::{
    LoginOutcome, LoginRequest, LoginResponse, ProfileResponse, VerifyDeviceRequest, MUST_VERIFY_IP,
};
use crate::error::ApiError;
use crate::http_client::{ApiClient, RequestOptions};
use crate::models::User;

/// Length of the emailed device verification code
const DEVICE_CODE_LENGTH: usize = 6;

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub is_authenticated: bool,

    /// True until the first session lookup finishes
    pub loading: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            loading: true,
        }
    }
}

/// Session layer over the API client
///
/// Decides when to log in and out and keeps the current user record. It
/// only touches the access token through `ApiClient::set_auth_token`.
#[derive(Clone)]
pub struct AuthSession {
    client: ApiClient,
    state: Arc<RwLock<SessionSnapshot>>,
}

impl AuthSession {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            state: Arc::new(RwLock::new(SessionSnapshot::default())),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.read().await.clone()
    }

    pub async fn user(&self) -> Option<User> {
        self.state.read().await.user.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated
    }

    /// Exchange credentials for an access token
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ApiError> {
        tracing::info!("Logging in as {}", email);

        let response: LoginResponse = self
            .client
            .post_json("/login", &LoginRequest { email, password })
            .await?;

        match response.access_token.filter(|t| !t.is_empty()) {
            Some(token) => {
                self.establish(token).await;
                Ok(LoginOutcome::Authenticated)
            }
            None if response.message.as_deref() == Some(MUST_VERIFY_IP) => {
                tracing::info!("Login from a new device, verification code required");
                Ok(LoginOutcome::DeviceVerificationRequired)
            }
            None => Err(ApiError::InvalidResponse(
                "Login response contained neither an access token nor a known message".to_string(),
            )),
        }
    }

    /// Confirm a new device with the emailed code
    ///
    /// Returns whether a session could be established afterwards, either from
    /// a token in the response or from the refresh cookie the backend set.
    pub async fn verify_device(&self, email: &str, code: &str) -> Result<bool, ApiError> {
        validate_device_code(code)?;

        let response: LoginResponse = self
            .client
            .post_json("/verify-device", &VerifyDeviceRequest { email, code })
            .await?;

        if let Some(message) = response.message.as_deref() {
            tracing::info!("Device verification: {}", message);
        }

        match response.access_token.filter(|t| !t.is_empty()) {
            Some(token) => Ok(self.establish(token).await),
            None => self.resume().await,
        }
    }

    /// Store a token obtained elsewhere (login, signup) and load the user
    pub async fn establish(&self, token: String) -> bool {
        self.client.set_auth_token(Some(token));
        self.fetch_session().await
    }

    /// Rebuild the session from the refresh cookie alone
    pub async fn resume(&self) -> Result<bool, ApiError> {
        match self.client.refresh_session().await {
            Ok(_) => Ok(self.fetch_session().await),
            Err(ApiError::Refresh(e)) => {
                tracing::debug!("No session to resume: {}", e);
                self.mark_signed_out().await;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Load the current user; any failure leaves the session signed out
    pub async fn fetch_session(&self) -> bool {
        match self.client.get_json::<ProfileResponse>("/profile").await {
            Ok(profile) => {
                tracing::info!("Session established for {}", profile.user.display_name());
                let mut state = self.state.write().await;
                state.user = Some(profile.user);
                state.is_authenticated = true;
                state.loading = false;
                true
            }
            Err(e) => {
                tracing::debug!("Profile lookup failed: {}", e);
                self.mark_signed_out().await;
                false
            }
        }
    }

    /// Drop the session locally, then tell the backend on a best-effort basis
    pub async fn logout(&self) {
        let token = self.client.auth_token();
        self.client.set_auth_token(None);
        self.mark_signed_out().await;
        tracing::info!("Logged out");

        // Carry the old token explicitly; a 401 here must not mint a new one
        let mut options = RequestOptions::default().without_refresh();
        if let Some(value) = token.and_then(|t| format!("Bearer {}", t).parse::<HeaderValue>().ok()) {
            options = options.header(AUTHORIZATION, value);
        }

        if let Err(e) = self
            .client
            .request::<serde_json::Value>(reqwest::Method::POST, "/logout", None, options)
            .await
        {
            tracing::warn!("Logout request failed: {}", e);
        }
    }

    async fn mark_signed_out(&self) {
        let mut state = self.state.write().await;
        state.user = None;
        state.is_authenticated = false;
        state.loading = false;
    }
}

/// Device codes are exactly six ASCII digits
pub fn validate_device_code(code: &str) -> Result<(), ApiError> {
    if code.len() == DEVICE_CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "Code must be {} digits",
            DEVICE_CODE_LENGTH
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_validate_device_code() {
        assert!(validate_device_code("123456").is_ok());
        assert!(validate_device_code("12345").is_err());
        assert!(validate_device_code("1234567").is_err());
        assert!(validate_device_code("12a456").is_err());
        assert!(validate_device_code("١٢٣٤٥٦").is_err());
    }

    #[tokio::test]
    async fn test_new_session_is_loading() {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let session = AuthSession::new(client);

        let snapshot = session.snapshot().await;
        assert!(snapshot.loading);
        assert!(!snapshot.is_authenticated);
        assert!(snapshot.user.is_none());
    }

    #[tokio::test]
    async fn test_invalid_device_code_skips_network() {
        // Port 9 is never answered; validation must fail before any request
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let session = AuthSession::new(client);

        let err = session.verify_device("a@example.com", "12").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
