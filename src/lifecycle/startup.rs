//! Startup configuration resolution.
//!
//! # Responsibilities
//! - Load the configuration file, or fall back to defaults
//! - Apply command-line overrides on top
//! - Validate the result once, after all sources are merged
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Overrides win over the file; the file wins over defaults

use std::fmt;
use std::path::PathBuf;

use crate::config::loader::{read_config, ConfigError};
use crate::config::validation::{validate_config, ValidationError};
use crate::config::GatewayConfig;

/// Settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct StartupOverrides {
    pub config_path: Option<PathBuf>,
    pub backend_url: Option<String>,
    pub bind_address: Option<String>,
}

#[derive(Debug)]
pub enum StartupError {
    Config(ConfigError),
    Invalid(Vec<ValidationError>),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Config(e) => write!(f, "{}", e),
            StartupError::Invalid(errors) => {
                write!(f, "invalid configuration:")?;
                for e in errors {
                    write!(f, "\n  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for StartupError {}

/// Merge file, defaults and overrides into a validated configuration.
pub fn resolve_config(overrides: &StartupOverrides) -> Result<GatewayConfig, StartupError> {
    let mut config = match &overrides.config_path {
        Some(path) => read_config(path).map_err(StartupError::Config)?,
        None => GatewayConfig::default(),
    };

    if let Some(url) = &overrides.backend_url {
        config.backend.url = url.clone();
    }
    if let Some(addr) = &overrides.bind_address {
        config.listener.bind_address = addr.clone();
    }

    validate_config(&config).map_err(StartupError::Invalid)?;
    Ok(config)
}
