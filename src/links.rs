// Link management
// Create, list, edit, disable and delete shortened links

use crate::error::ApiError;
use crate::http_client::ApiClient;
use crate::models::link::{DisableRequest, ShortenRequest, ShortenResponse};
use crate::models::{Link, LinkUpdate};

/// Operations on the current user's links
#[derive(Clone)]
pub struct LinkService {
    client: ApiClient,
}

impl LinkService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Shorten a URL and return the new alias
    pub async fn shorten(&self, url: &str) -> Result<String, ApiError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ApiError::Validation("URL is required".to_string()));
        }
        reqwest::Url::parse(url)
            .map_err(|e| ApiError::Validation(format!("Invalid URL '{}': {}", url, e)))?;

        let response: ShortenResponse = self
            .client
            .post_json("/url/short", &ShortenRequest { url })
            .await?;

        tracing::info!("Shortened {} → {}", url, response.short_url);
        Ok(response.short_url)
    }

    pub async fn list_mine(&self) -> Result<Vec<Link>, ApiError> {
        self.client.get_json("/url/me").await
    }

    pub async fn get(&self, short_url: &str) -> Result<Link, ApiError> {
        self.client
            .get_json(&format!("/url/{}", path_segment(short_url)?))
            .await
    }

    /// Save the edit form; returns the updated link
    pub async fn update(&self, short_url: &str, update: &LinkUpdate) -> Result<Link, ApiError> {
        let payload = update.payload()?;
        self.client
            .put_json(&format!("/url/{}", path_segment(short_url)?), &payload)
            .await
    }

    pub async fn delete(&self, short_url: &str) -> Result<(), ApiError> {
        self.client
            .post_empty(&format!("/url/delete/{}", path_segment(short_url)?))
            .await?;
        tracing::info!("Deleted link {}", short_url);
        Ok(())
    }

    /// Flip the status switch; `checked` is the link's new active state
    pub async fn set_disabled(&self, short_url: &str, checked: bool) -> Result<(), ApiError> {
        self.client
            .post(
                &format!("/url/disable/{}", path_segment(short_url)?),
                &DisableRequest { checked },
            )
            .await?;
        Ok(())
    }
}

/// Aliases end up in the URL path; refuse anything that would change it
pub(crate) fn path_segment(alias: &str) -> Result<&str, ApiError> {
    let alias = alias.trim();
    if alias.is_empty() || alias.contains(['/', '?', '#']) {
        return Err(ApiError::Validation(format!("Invalid link alias '{}'", alias)));
    }
    Ok(alias)
}
