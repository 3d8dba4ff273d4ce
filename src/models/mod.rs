// Data models for the TurboLink API

pub mod analytics;
pub mod link;
pub mod user;

pub use analytics::{AnalyticsSummary, ClickDetail, LinkAnalytics, NameCount};
pub use link::{Link, LinkDetails, LinkUpdate, LinkUpdatePayload};
pub use user::{GoogleProfileUpdate, ProfileUpdate, User};
