//! Account credentials
//!
//! Login, caching, expiry tracking and renewal of per-account bearer tokens.

pub mod account;
pub mod manager;
pub mod token;

pub use account::AccountConfig;
pub use manager::{TokenManager, DEFAULT_ACCOUNT, DEFAULT_REFRESH_INTERVAL};
pub use token::{TokenInfo, EXPIRY_MARGIN};
