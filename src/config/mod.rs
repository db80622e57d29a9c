//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, DatabaseConfig)
//! - [`listen`]: WebSocket listener configuration (ListenConfig)
//! - [`security`]: Token auth and inbound rate limits (AuthConfig, RateLimitConfig)
//! - [`limits`]: Queue sizes, message caps and ephemeral-state timeouts (LimitsConfig)
//! - [`validation`]: Startup validation

mod limits;
mod listen;
mod security;
mod types;
mod validation;

pub use limits::LimitsConfig;
pub use listen::ListenConfig;
pub use security::RateLimitConfig;
pub use types::{Config, LogFormat, StoreBackend};
pub use validation::validate;
