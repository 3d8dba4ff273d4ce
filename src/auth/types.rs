// Authentication types

use serde::{Deserialize, Serialize};

use crate::models::User;

/// Backend message returned when a login comes from an unknown device
pub const MUST_VERIFY_IP: &str = "mustVerifyIp";

/// Login request
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Login response: either a token or a verification demand
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: Option<String>,
    pub message: Option<String>,
}

/// Result of a login attempt that reached the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Token stored, session established
    Authenticated,
    /// Backend sent a code to the user's email; call `verify_device`
    DeviceVerificationRequired,
}

/// Refresh response
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: Option<String>,
}

/// `GET /profile` response
#[derive(Debug, Deserialize)]
pub struct ProfileResponse {
    pub user: User,
}

/// Device verification request
#[derive(Debug, Serialize)]
pub struct VerifyDeviceRequest<'a> {
    pub email: &'a str,
    pub code: &'a str,
}

/// Generic `{ "message": ... }` body used by most account endpoints
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}
