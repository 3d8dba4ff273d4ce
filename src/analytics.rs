// Click analytics
// Fetches a link's click log and breaks it down per dimension

use std::collections::HashMap;

use crate::error::ApiError;
use crate::http_client::ApiClient;
use crate::links::path_segment;
use crate::models::{AnalyticsSummary, ClickDetail, LinkAnalytics, NameCount};

/// Label used when a click lacks a value for a dimension
pub const UNKNOWN: &str = "Unknown";

#[derive(Clone)]
pub struct AnalyticsService {
    client: ApiClient,
}

impl AnalyticsService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, short_url: &str) -> Result<LinkAnalytics, ApiError> {
        self.client
            .get_json(&format!("/url/analytics/{}", path_segment(short_url)?))
            .await
    }
}

/// Count clicks per browser, OS, country and referrer
pub fn summarize(analytics: &LinkAnalytics) -> AnalyticsSummary {
    let details = &analytics.click_details;

    AnalyticsSummary {
        browsers: count_by(details, |c| c.browser.as_deref()),
        os: count_by(details, |c| c.os.as_deref()),
        countries: count_by(details, |c| c.country.as_deref()),
        referrers: count_by(details, |c| c.referrer.as_deref()),
    }
}

/// Group by key, keeping the order in which each name first appeared
fn count_by<F>(details: &[ClickDetail], key: F) -> Vec<NameCount>
where
    F: Fn(&ClickDetail) -> Option<&str>,
{
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<NameCount> = Vec::new();

    for detail in details {
        let name = key(detail).filter(|v| !v.is_empty()).unwrap_or(UNKNOWN);
        match index.get(name) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(name, counts.len());
                counts.push(NameCount {
                    name: name.to_string(),
                    count: 1,
                });
            }
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn click(browser: Option<&str>, country: Option<&str>) -> ClickDetail {
        ClickDetail {
            browser: browser.map(str::to_string),
            country: country.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_log_gives_empty_summary() {
        assert_eq!(summarize(&LinkAnalytics::default()), AnalyticsSummary::default());
    }

    #[test]
    fn test_counts_preserve_first_seen_order() {
        let analytics = LinkAnalytics {
            clicks: 4,
            click_details: vec![
                click(Some("Firefox"), Some("FR")),
                click(Some("Chrome"), None),
                click(Some("Firefox"), Some("FR")),
                click(None, Some("")),
            ],
            created_at: None,
        };

        let summary = summarize(&analytics);
        assert_eq!(
            summary.browsers,
            vec![
                NameCount { name: "Firefox".into(), count: 2 },
                NameCount { name: "Chrome".into(), count: 1 },
                NameCount { name: UNKNOWN.into(), count: 1 },
            ]
        );
        assert_eq!(
            summary.countries,
            vec![
                NameCount { name: "FR".into(), count: 2 },
                NameCount { name: UNKNOWN.into(), count: 2 },
            ]
        );
        assert_eq!(summary.os, vec![NameCount { name: UNKNOWN.into(), count: 4 }]);
    }

    #[test]
    fn test_analytics_payload_parses() {
        let analytics: LinkAnalytics = serde_json::from_str(
            r#"{
                "clicks": 2,
                "click_details": [
                    {"browser": "Safari", "os": "iOS", "country": "US", "referrer": "direct",
                     "ip_address": "203.0.113.9", "timestamp": "2024-05-01T10:00:00Z"},
                    {"browser": null, "os": "Linux"}
                ]
            }"#,
        )
        .unwrap();

        let summary = summarize(&analytics);
        assert_eq!(summary.referrers.len(), 2);
        assert_eq!(summary.os[1].name, "Linux");
    }

    proptest! {
        #[test]
        fn prop_counts_sum_to_click_log_length(
            browsers in proptest::collection::vec(proptest::option::of("[a-c]{0,2}"), 0..40)
        ) {
            let analytics = LinkAnalytics {
                clicks: browsers.len() as u64,
                click_details: browsers
                    .iter()
                    .map(|b| click(b.as_deref(), None))
                    .collect(),
                created_at: None,
            };

            let summary = summarize(&analytics);
            let total: u64 = summary.browsers.iter().map(|n| n.count).sum();
            prop_assert_eq!(total, browsers.len() as u64);

            let mut names: Vec<&str> = summary.browsers.iter().map(|n| n.name.as_str()).collect();
            let before = names.len();
            names.sort_unstable();
            names.dedup();
            prop_assert_eq!(names.len(), before);
            prop_assert!(summary.browsers.iter().all(|n| n.count > 0 && !n.name.is_empty()));
        }
    }
}
