//! Security module for parley.
//!
//! Provides:
//! - **Tokens**: HMAC-SHA256 bearer token verification for connection admission
//! - **Rate Limiting**: Governor-based per-connection flood protection

pub mod rate_limit;
pub mod token;

pub use rate_limit::RateLimitManager;
pub use token::{AuthError, Authenticator, HmacAuthenticator, extract_token};
