use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

// ==================================================================================================
// Response Models
// ==================================================================================================

/// A shortened link owned by the current user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub short_url: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub max_clicks: Option<u64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub password_protected: bool,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Link {
    /// Destination URL, whichever field the backend filled in
    pub fn destination(&self) -> &str {
        if self.redirect_url.is_empty() {
            self.original_url.as_deref().unwrap_or_default()
        } else {
            &self.redirect_url
        }
    }

    /// Share of the click budget used, rounded to the nearest percent
    pub fn usage_percent(&self) -> Option<u64> {
        self.max_clicks
            .filter(|max| *max > 0)
            .map(|max| ((self.clicks as f64 / max as f64) * 100.0).round() as u64)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry < now)
    }

    /// Links are active unless explicitly disabled or past their expiry
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active != Some(false) && !self.is_expired_at(now)
    }
}

/// `POST /url/short` response
#[derive(Debug, Clone, Deserialize)]
pub struct ShortenResponse {
    #[serde(rename = "shortUrl")]
    pub short_url: String,
}

/// `GET /url/details/{alias}` response used to gate redirects
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LinkDetails {
    #[serde(rename = "requirePassword", default)]
    pub require_password: bool,
    #[serde(default)]
    pub short_url: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
}

// ==================================================================================================
// Request Models
// ==================================================================================================

#[derive(Debug, Serialize)]
pub struct ShortenRequest<'a> {
    pub url: &'a str,
}

#[derive(Debug, Serialize)]
pub struct DisableRequest {
    pub checked: bool,
}

#[derive(Debug, Serialize)]
pub struct VerifyPasswordRequest<'a> {
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ClickRequest<'a> {
    pub referrer: &'a str,
}

/// Edit form for an existing link
#[derive(Debug, Clone, Default)]
pub struct LinkUpdate {
    pub redirect_url: String,
    pub short_url: String,
    pub password: Option<String>,
    pub max_clicks: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,

    /// Whether the password input is shown; hiding it while empty removes protection
    pub password_field_shown: bool,
}

/// Body sent to `PUT /url/{short}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkUpdatePayload {
    pub redirect_url: String,
    pub short_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_password: Option<bool>,
    pub max_clicks: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LinkUpdate {
    /// Validate the form and build the request body
    pub fn payload(&self) -> Result<LinkUpdatePayload, ApiError> {
        if self.redirect_url.trim().is_empty() || self.short_url.trim().is_empty() {
            return Err(ApiError::Validation(
                "Destination URL and short alias are required".to_string(),
            ));
        }

        let password = self.password.clone().filter(|p| !p.is_empty());
        let disable_password = if !self.password_field_shown && password.is_none() {
            Some(true)
        } else {
            None
        };

        Ok(LinkUpdatePayload {
            redirect_url: self.redirect_url.trim().to_string(),
            short_url: self.short_url.trim().to_string(),
            password,
            disable_password,
            max_clicks: self.max_clicks,
            expires_at: self.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn link(json: serde_json::Value) -> Link {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_link_deserializes_backend_shape() {
        let link = link(serde_json::json!({
            "_id": "65a1",
            "short_url": "abc",
            "redirect_url": "https://example.com",
            "clicks": 3,
            "max_clicks": 10,
            "is_active": true,
            "password_protected": false,
            "createdAt": "2024-05-01T10:00:00Z"
        }));

        assert_eq!(link.id.as_deref(), Some("65a1"));
        assert_eq!(link.destination(), "https://example.com");
        assert_eq!(link.usage_percent(), Some(30));
        assert!(link.created_at.is_some());
    }

    #[test]
    fn test_destination_falls_back_to_original_url() {
        let link = link(serde_json::json!({
            "short_url": "abc",
            "original_url": "https://fallback.example"
        }));
        assert_eq!(link.destination(), "https://fallback.example");
    }

    #[test]
    fn test_usage_percent_without_budget() {
        let mut l = link(serde_json::json!({ "short_url": "abc", "clicks": 7 }));
        assert_eq!(l.usage_percent(), None);

        l.max_clicks = Some(0);
        assert_eq!(l.usage_percent(), None);

        l.max_clicks = Some(3);
        assert_eq!(l.usage_percent(), Some(233));
    }

    #[test]
    fn test_activity() {
        let now = Utc::now();
        let mut l = link(serde_json::json!({ "short_url": "abc" }));
        assert!(l.is_active_at(now));

        l.is_active = Some(false);
        assert!(!l.is_active_at(now));

        l.is_active = None;
        l.expires_at = Some(now - Duration::minutes(1));
        assert!(l.is_expired_at(now));
        assert!(!l.is_active_at(now));

        l.expires_at = Some(now + Duration::days(1));
        assert!(l.is_active_at(now));
    }

    #[test]
    fn test_update_hidden_empty_password_disables_protection() {
        let update = LinkUpdate {
            redirect_url: "https://example.com".to_string(),
            short_url: "abc".to_string(),
            password: None,
            password_field_shown: false,
            ..Default::default()
        };

        let payload = update.payload().unwrap();
        assert_eq!(payload.disable_password, Some(true));
        assert_eq!(payload.password, None);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["disable_password"], true);
        assert!(json.get("password").is_none());
        assert!(json["max_clicks"].is_null());
    }

    #[test]
    fn test_update_shown_empty_password_is_omitted() {
        let update = LinkUpdate {
            redirect_url: "https://example.com".to_string(),
            short_url: "abc".to_string(),
            password: Some(String::new()),
            password_field_shown: true,
            ..Default::default()
        };

        let json = serde_json::to_value(update.payload().unwrap()).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("disable_password").is_none());
    }

    #[test]
    fn test_update_with_password() {
        let update = LinkUpdate {
            redirect_url: "https://example.com".to_string(),
            short_url: "abc".to_string(),
            password: Some("hunter2".to_string()),
            password_field_shown: true,
            max_clicks: Some(50),
            ..Default::default()
        };

        let payload = update.payload().unwrap();
        assert_eq!(payload.password.as_deref(), Some("hunter2"));
        assert_eq!(payload.disable_password, None);
        assert_eq!(payload.max_clicks, Some(50));
    }

    #[test]
    fn test_update_requires_destination_and_alias() {
        let update = LinkUpdate {
            redirect_url: "  ".to_string(),
            short_url: "abc".to_string(),
            ..Default::default()
        };
        assert!(matches!(update.payload(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_link_details_defaults() {
        let details: LinkDetails = serde_json::from_str(r#"{"redirect_url":"https://x.example"}"#).unwrap();
        assert!(!details.require_password);
        assert_eq!(details.redirect_url.as_deref(), Some("https://x.example"));
    }
}
