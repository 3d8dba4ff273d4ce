// Authentication module
// Manages the access token lifecycle and the user session

mod refresh;
mod session;
mod token;
mod types;

pub use refresh::{RefreshCoordinator, RefreshError, RefreshOutcome, RefreshState};
pub use session::{validate_device_code, AuthSession, SessionSnapshot};
pub use token::TokenStore;
pub use types::{LoginOutcome, MessageResponse, RefreshResponse, MUST_VERIFY_IP};
