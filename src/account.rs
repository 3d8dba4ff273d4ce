// Account management
// Signup, email verification, password reset, profile edits and avatars

use reqwest::Response;

use crate::auth::MessageResponse;
use crate::error::ApiError;
use crate::http_client::{ApiClient, FilePart};
use crate::models::user::{
    AvatarUploadResponse, AvatarUrlRequest, ForgotPasswordRequest, ResendVerificationRequest,
    ResetPasswordRequest, SignupRequest, SignupResponse, VerifyEmailRequest,
};
use crate::models::{GoogleProfileUpdate, ProfileUpdate};

/// Shortest password the reset form accepts
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Largest avatar image the upload endpoint takes
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

/// Form field carrying the avatar image
const AVATAR_FIELD: &str = "image";

#[derive(Clone)]
pub struct AccountService {
    client: ApiClient,
}

impl AccountService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Create an account; the response may already carry an access token
    pub async fn signup(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<SignupResponse, ApiError> {
        if email.trim().is_empty() || username.trim().is_empty() || password.is_empty() {
            return Err(ApiError::Validation(
                "Email, username and password are required".to_string(),
            ));
        }

        let response = self
            .client
            .post(
                "/signup",
                &SignupRequest {
                    email: email.trim(),
                    username: username.trim(),
                    password,
                },
            )
            .await?;

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(SignupResponse::default());
        }
        serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Confirm an email address with the token from the verification mail
    pub async fn verify_email(&self, token: Option<&str>) -> Result<Option<String>, ApiError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Validation("Verification token is missing".to_string()))?;

        let response = self
            .client
            .post("/verify-email", &VerifyEmailRequest { token })
            .await?;
        message_of(response).await
    }

    pub async fn resend_verification(&self, user_id: &str) -> Result<Option<String>, ApiError> {
        if user_id.is_empty() {
            return Err(ApiError::Validation("User id is required".to_string()));
        }
        let response = self
            .client
            .post(
                "/resend-verification-link",
                &ResendVerificationRequest { user_id },
            )
            .await?;
        message_of(response).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<Option<String>, ApiError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ApiError::Validation("Email is required".to_string()));
        }
        let response = self
            .client
            .post("/forgot-password", &ForgotPasswordRequest { email })
            .await?;
        message_of(response).await
    }

    /// Set a new password from a reset link
    pub async fn reset_password(
        &self,
        token: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<Option<String>, ApiError> {
        validate_new_password(password, confirmation)?;
        if token.trim().is_empty() {
            return Err(ApiError::Validation("Reset token is missing".to_string()));
        }

        let response = self
            .client
            .post(
                "/forgot-password/reset",
                &ResetPasswordRequest {
                    password,
                    token: token.trim(),
                },
            )
            .await?;
        message_of(response).await
    }

    /// Save profile changes; any 2xx means the backend stored them
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Option<String>, ApiError> {
        require_names(&update.first_name, &update.last_name)?;
        if update.email.trim().is_empty() {
            return Err(ApiError::Validation("Email is required".to_string()));
        }
        if update.password.is_empty() {
            return Err(ApiError::Validation(
                "Current password is required to update the profile".to_string(),
            ));
        }

        let response = self.client.post("/update-profile", update).await?;
        tracing::info!(user_id = %update.user_id, "Profile updated");
        message_of(response).await
    }

    /// Save profile changes for a Google account
    pub async fn update_google_profile(
        &self,
        update: &GoogleProfileUpdate,
    ) -> Result<Option<String>, ApiError> {
        require_names(&update.first_name, &update.last_name)?;
        if update.access_token.is_empty() {
            return Err(ApiError::Validation("Google verification required".to_string()));
        }

        let response = self.client.post("/update-google-profile", update).await?;
        tracing::info!(user_id = %update.user_id, "Google profile updated");
        message_of(response).await
    }

    /// Upload an image and return the URL the backend stored it under
    pub async fn upload_avatar(
        &self,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ApiError> {
        if bytes.is_empty() {
            return Err(ApiError::Validation("No file selected".to_string()));
        }
        if bytes.len() > MAX_AVATAR_BYTES {
            return Err(ApiError::Validation(format!(
                "File is too large ({} bytes, limit {})",
                bytes.len(),
                MAX_AVATAR_BYTES
            )));
        }

        let file = FilePart {
            field: AVATAR_FIELD.to_string(),
            file_name: file_name.to_string(),
            mime: mime.to_string(),
            bytes,
        };
        let response = self.client.post_multipart("/upload-avatar", file).await?;
        let uploaded: AvatarUploadResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        if uploaded.url.is_empty() {
            return Err(ApiError::InvalidResponse("Upload returned no URL".to_string()));
        }
        tracing::debug!(url = %uploaded.url, "Avatar uploaded");
        Ok(uploaded.url)
    }

    /// Point the account's avatar at an uploaded or external image
    pub async fn set_avatar_url(
        &self,
        user_id: &str,
        avatar: &str,
    ) -> Result<Option<String>, ApiError> {
        if user_id.is_empty() {
            return Err(ApiError::Validation("User id is required".to_string()));
        }
        let avatar = avatar.trim();
        if !avatar.starts_with("http") {
            return Err(ApiError::Validation(
                "Avatar URL must start with http".to_string(),
            ));
        }

        let response = self
            .client
            .post("/update-avatart-url", &AvatarUrlRequest { user_id, avatar })
            .await?;
        message_of(response).await
    }
}

/// Content type for an avatar file, from its extension
pub fn avatar_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

fn require_names(first_name: &str, last_name: &str) -> Result<(), ApiError> {
    if first_name.trim().is_empty() || last_name.trim().is_empty() {
        return Err(ApiError::Validation(
            "First and last name are required".to_string(),
        ));
    }
    Ok(())
}

/// Reset form rules: long enough and typed the same twice
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password != confirmation {
        return Err(ApiError::Validation("Passwords do not match".to_string()));
    }
    Ok(())
}

/// Extract the optional `message` from a success body, tolerating empty bodies
async fn message_of(response: Response) -> Result<Option<String>, ApiError> {
    let body = response.text().await?;
    Ok(serde_json::from_str::<MessageResponse>(&body)
        .ok()
        .and_then(|m| m.message))
}
