//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::{Config, StoreBackend};
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("auth.secret is required")]
    MissingAuthSecret,
    #[error("limits.outbound_queue must be greater than zero")]
    ZeroOutboundQueue,
    #[error("limits.max_connections_per_identity must be greater than zero")]
    ZeroConnectionsPerIdentity,
    #[error("limits.max_message_len must be greater than zero")]
    ZeroMessageLen,
    #[error("rate_limits.events_per_second and event_burst must be greater than zero")]
    ZeroEventRate,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }
    if config.auth.secret.is_empty() {
        errors.push(ValidationError::MissingAuthSecret);
    }

    let limits = &config.limits;
    if limits.outbound_queue == 0 {
        errors.push(ValidationError::ZeroOutboundQueue);
    }
    if limits.max_connections_per_identity == 0 {
        errors.push(ValidationError::ZeroConnectionsPerIdentity);
    }
    if limits.max_message_len == 0 {
        errors.push(ValidationError::ZeroMessageLen);
    }
    if config.rate_limits.events_per_second == 0 || config.rate_limits.event_burst == 0 {
        errors.push(ValidationError::ZeroEventRate);
    }

    if config.database.backend == StoreBackend::Sqlite && config.database.path != ":memory:" {
        let db_path = Path::new(&config.database.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(config.database.path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
