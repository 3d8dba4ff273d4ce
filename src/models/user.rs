use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account record returned by `GET /profile`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(default)]
    pub is_google_user: bool,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Best available name for display
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Serialize)]
pub struct SignupRequest<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

/// Signup response; some backends log the new user straight in
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub access_token: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyEmailRequest<'a> {
    pub token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendVerificationRequest<'a> {
    pub user_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordRequest<'a> {
    pub password: &'a str,
    pub token: &'a str,
}

/// Profile edit; the current password proves ownership
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
}

/// Profile edit for Google accounts; a fresh Google access token replaces the password
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleProfileUpdate {
    pub user_id: String,
    pub access_token: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
}

#[derive(Debug, Deserialize)]
pub struct AvatarUploadResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarUrlRequest<'a> {
    pub user_id: &'a str,
    pub avatar: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_from_profile_payload() {
        let user: User = serde_json::from_value(serde_json::json!({
            "_id": "u1",
            "username": "ada",
            "email": "ada@example.com",
            "is_email_verified": true
        }))
        .unwrap();

        assert_eq!(user.display_name(), "ada");
        assert!(user.is_email_verified);
        assert!(!user.is_google_user);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let user = User {
            id: "u1".to_string(),
            email: Some("ada@example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(user.display_name(), "ada@example.com");

        let user = User {
            id: "u1".to_string(),
            ..Default::default()
        };
        assert_eq!(user.display_name(), "u1");
    }

    #[test]
    fn test_profile_update_uses_camel_case() {
        let update = ProfileUpdate {
            user_id: "u1".to_string(),
            first_name: "Ada".to_string(),
            phone_number: "555".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["firstName"], "Ada");
        assert_eq!(json["phoneNumber"], "555");
    }

    #[test]
    fn test_google_profile_update_field_names() {
        let update = GoogleProfileUpdate {
            user_id: "u1".to_string(),
            access_token: "g-token".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["accessToken"], "g-token");
        assert!(json.get("email").is_none());
    }
}
