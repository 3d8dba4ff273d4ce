use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `GET /url/analytics/{short}` response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LinkAnalytics {
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub click_details: Vec<ClickDetail>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One recorded visit
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClickDetail {
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Click count for one browser, OS, country or referrer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameCount {
    pub name: String,
    pub count: u64,
}

/// Per-dimension breakdown of a link's clicks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalyticsSummary {
    pub browsers: Vec<NameCount>,
    pub os: Vec<NameCount>,
    pub countries: Vec<NameCount>,
    pub referrers: Vec<NameCount>,
}
