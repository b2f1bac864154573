//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes > 0, addresses parse)
//! - Check the backend URL can carry media paths
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("backend.url `{0}` is not a valid base URL")]
    BackendUrl(String),

    #[error("backend.url scheme `{0}` is not http or https")]
    BackendScheme(String),

    #[error("stream.ws_path `{0}` must start with '/'")]
    WsPath(String),

    #[error("stream.chunk_size must be greater than zero")]
    ChunkSize,

    #[error("stream.packet_queue_capacity must be greater than zero")]
    QueueCapacity,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    match Url::parse(&config.backend.url) {
        Ok(url) if url.cannot_be_a_base() => {
            errors.push(ValidationError::BackendUrl(config.backend.url.clone()));
        }
        Ok(url) if !matches!(url.scheme(), "http" | "https") => {
            errors.push(ValidationError::BackendScheme(url.scheme().to_string()));
        }
        Ok(_) => {}
        Err(_) => errors.push(ValidationError::BackendUrl(config.backend.url.clone())),
    }

    if !config.stream.ws_path.starts_with('/') {
        errors.push(ValidationError::WsPath(config.stream.ws_path.clone()));
    }
    if config.stream.chunk_size == 0 {
        errors.push(ValidationError::ChunkSize);
    }
    if config.stream.packet_queue_capacity == 0 {
        errors.push(ValidationError::QueueCapacity);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.backend.url = "ftp://nvr.local".into();
        config.stream.ws_path = "ws".into();
        config.stream.chunk_size = 0;
        config.stream.packet_queue_capacity = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::BindAddress("not-an-address".into()),
                ValidationError::BackendScheme("ftp".into()),
                ValidationError::WsPath("ws".into()),
                ValidationError::ChunkSize,
                ValidationError::QueueCapacity,
            ]
        );
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = GatewayConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::MetricsAddress("nowhere".into())])
        );
    }
}
