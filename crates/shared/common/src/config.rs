//! Shared configuration structures.

use std::env;

use serde::{Deserialize, Serialize};

/// Default log filter when neither `RUST_LOG` nor `MAPPER_LOG_LEVEL` is set
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Mapper-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MapperConfig {
    /// Construct lazy proxies unless a call asks otherwise
    pub lazy_by_default: bool,
    /// Resolve the most-derived type unless a call asks otherwise
    pub infer_type_by_default: bool,
    /// Log level
    pub log_level: String,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            lazy_by_default: false,
            infer_type_by_default: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl MapperConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lazy_by_default: env_flag("MAPPER_LAZY").unwrap_or(defaults.lazy_by_default),
            infer_type_by_default: env_flag("MAPPER_INFER_TYPE")
                .unwrap_or(defaults.infer_type_by_default),
            log_level: env::var("MAPPER_LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }
}

/// Parse a boolean environment flag (`1/0`, `true/false`, `yes/no`).
fn env_flag(name: &str) -> Option<bool> {
    let raw = env::var(name).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            tracing::warn!(variable = %name, value = %other, "Ignoring unparsable flag");
            None
        }
    }
}
