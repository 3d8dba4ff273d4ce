// Redirect gate
// Decides what a visitor of a short link sees before being sent on

use crate::error::ApiError;
use crate::http_client::ApiClient;
use crate::links::path_segment;
use crate::models::link::{ClickRequest, VerifyPasswordRequest};
use crate::models::LinkDetails;

/// Backend message for links switched off by their owner
pub const URL_DISABLED: &str = "urlDisabled";

/// Referrer recorded when the visitor arrived without one
pub const DIRECT_REFERRER: &str = "direct";

const DEFAULT_FAILURE: &str = "Failed to load link.";

/// Outcome of looking up a short link
#[derive(Debug, Clone, PartialEq)]
pub enum RedirectDecision {
    /// Send the visitor to `url`; `short_url` is where the click is recorded
    Redirect {
        url: String,
        short_url: Option<String>,
    },
    PasswordRequired,
    Disabled,
    Failed { message: String },
}

impl RedirectDecision {
    fn from_details(details: LinkDetails) -> Self {
        if details.require_password {
            return RedirectDecision::PasswordRequired;
        }
        match details.redirect_url.filter(|u| !u.is_empty()) {
            Some(url) => RedirectDecision::Redirect {
                url,
                short_url: details.short_url,
            },
            None => RedirectDecision::Failed {
                message: "Link has no destination".to_string(),
            },
        }
    }
}

#[derive(Clone)]
pub struct RedirectGate {
    client: ApiClient,
}

impl RedirectGate {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Look up an alias; every failure is folded into the decision
    pub async fn resolve(&self, alias: &str) -> RedirectDecision {
        let path = match path_segment(alias) {
            Ok(alias) => format!("/url/details/{}", alias),
            Err(e) => {
                return RedirectDecision::Failed {
                    message: e.to_string(),
                }
            }
        };

        match self.client.get_json::<LinkDetails>(&path).await {
            Ok(details) => RedirectDecision::from_details(details),
            Err(ApiError::Status { message, .. }) if message == URL_DISABLED => {
                RedirectDecision::Disabled
            }
            Err(ApiError::Status { message, .. }) if !message.is_empty() => {
                RedirectDecision::Failed { message }
            }
            Err(e) => {
                tracing::debug!("Link lookup for {} failed: {}", alias, e);
                RedirectDecision::Failed {
                    message: DEFAULT_FAILURE.to_string(),
                }
            }
        }
    }

    /// Unlock a protected link
    pub async fn submit_password(
        &self,
        alias: &str,
        password: &str,
    ) -> Result<RedirectDecision, ApiError> {
        if password.is_empty() {
            return Err(ApiError::Validation("Password is required".to_string()));
        }

        let details: LinkDetails = self
            .client
            .post_json(
                &format!("/url/verify/{}", path_segment(alias)?),
                &VerifyPasswordRequest { password },
            )
            .await?;

        Ok(RedirectDecision::from_details(LinkDetails {
            require_password: false,
            ..details
        }))
    }

    /// Count a visit; failures are logged and otherwise ignored
    pub async fn record_click(&self, short_url: &str, referrer: Option<&str>) {
        let referrer = referrer
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DIRECT_REFERRER);

        let result = match path_segment(short_url) {
            Ok(short) => self
                .client
                .post(
                    &format!("/url/analytics/{}", short),
                    &ClickRequest { referrer },
                )
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::warn!("Failed to record click for {}: {}", short_url, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_from_details() {
        let protected = LinkDetails {
            require_password: true,
            redirect_url: Some("https://example.com".into()),
            ..Default::default()
        };
        assert_eq!(
            RedirectDecision::from_details(protected),
            RedirectDecision::PasswordRequired
        );

        let open = LinkDetails {
            short_url: Some("abc".into()),
            redirect_url: Some("https://example.com".into()),
            ..Default::default()
        };
        assert_eq!(
            RedirectDecision::from_details(open),
            RedirectDecision::Redirect {
                url: "https://example.com".into(),
                short_url: Some("abc".into()),
            }
        );

        assert!(matches!(
            RedirectDecision::from_details(LinkDetails::default()),
            RedirectDecision::Failed { .. }
        ));
    }
}
