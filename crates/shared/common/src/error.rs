//! Unified error handling for the mapping pipeline.
//!
//! Configuration-time errors abort publication to the configuration cache,
//! construction errors are recoverable only for optional properties, and
//! save errors report how far a partial write got. Errors are `Clone` so
//! that every caller waiting on the same configuration build can observe
//! the same failure.

use domain::DomainError;
use thiserror::Error;

/// Mapping error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapperError {
    // Configuration time
    #[error("Invalid configuration for {type_key}: {message}")]
    Configuration { type_key: String, message: String },

    #[error("No data mapper can handle property {type_key}.{property}")]
    UnmappableField { type_key: String, property: String },

    #[error("Type {0} is not declared")]
    UnknownType(String),

    #[error("Type {type_key} has no property {property}")]
    UnknownProperty { type_key: String, property: String },

    // Object time
    #[error("Failed to construct {type_key}{}: {message}", property_suffix(.property))]
    Construction {
        type_key: String,
        property: Option<String>,
        message: String,
    },

    #[error("Failed to save {type_key}.{property}: {message}")]
    Save {
        type_key: String,
        property: String,
        message: String,
        /// Properties written before the failure (left committed)
        written: Vec<String>,
    },

    /// A data mapper could not convert between raw and typed values
    #[error("{0}")]
    Mapping(String),

    // Collaborators
    #[error("Dependency not available: {0}")]
    Dependency(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    // Internal
    #[error("Internal error: {0}")]
    Internal(String),
}

fn property_suffix(property: &Option<String>) -> String {
    property
        .as_ref()
        .map(|p| format!(".{}", p))
        .unwrap_or_default()
}

impl MapperError {
    /// Get a stable error code
    pub fn code(&self) -> &'static str {
        match self {
            MapperError::Configuration { .. } => "CONFIGURATION_ERROR",
            MapperError::UnmappableField { .. } => "UNMAPPABLE_FIELD",
            MapperError::UnknownType(_) => "UNKNOWN_TYPE",
            MapperError::UnknownProperty { .. } => "UNKNOWN_PROPERTY",
            MapperError::Construction { .. } => "CONSTRUCTION_ERROR",
            MapperError::Save { .. } => "SAVE_ERROR",
            MapperError::Mapping(_) => "MAPPING_ERROR",
            MapperError::Dependency(_) => "DEPENDENCY_ERROR",
            MapperError::Domain(_) => "STORE_ERROR",
            MapperError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error was raised while resolving a configuration
    pub fn is_configuration_time(&self) -> bool {
        matches!(
            self,
            MapperError::Configuration { .. }
                | MapperError::UnmappableField { .. }
                | MapperError::UnknownType(_)
        )
    }
}

/// Result type alias
pub type MapperResult<T> = Result<T, MapperError>;

/// Extension trait for Option -> MapperError conversion
pub trait OptionExt<T> {
    fn ok_or_unknown_type(self, type_key: &str) -> MapperResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_unknown_type(self, type_key: &str) -> MapperResult<T> {
        self.ok_or_else(|| MapperError::UnknownType(type_key.to_string()))
    }
}

/// Convenience constructors
impl MapperError {
    pub fn configuration(type_key: impl Into<String>, msg: impl Into<String>) -> Self {
        MapperError::Configuration {
            type_key: type_key.into(),
            message: msg.into(),
        }
    }

    pub fn unmappable(type_key: impl Into<String>, property: impl Into<String>) -> Self {
        MapperError::UnmappableField {
            type_key: type_key.into(),
            property: property.into(),
        }
    }

    pub fn unknown_property(type_key: impl Into<String>, property: impl Into<String>) -> Self {
        MapperError::UnknownProperty {
            type_key: type_key.into(),
            property: property.into(),
        }
    }

    pub fn construction(type_key: impl Into<String>, msg: impl Into<String>) -> Self {
        MapperError::Construction {
            type_key: type_key.into(),
            property: None,
            message: msg.into(),
        }
    }

    pub fn property_construction(
        type_key: impl Into<String>,
        property: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        MapperError::Construction {
            type_key: type_key.into(),
            property: Some(property.into()),
            message: msg.into(),
        }
    }

    pub fn save(
        type_key: impl Into<String>,
        property: impl Into<String>,
        msg: impl Into<String>,
        written: Vec<String>,
    ) -> Self {
        MapperError::Save {
            type_key: type_key.into(),
            property: property.into(),
            message: msg.into(),
            written,
        }
    }

    pub fn mapping(msg: impl Into<String>) -> Self {
        MapperError::Mapping(msg.into())
    }

    pub fn dependency(contract: impl Into<String>) -> Self {
        MapperError::Dependency(contract.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        MapperError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_message_includes_property() {
        let err = MapperError::property_construction("Article", "Title", "boom");
        assert_eq!(err.to_string(), "Failed to construct Article.Title: boom");

        let err = MapperError::construction("Article", "boom");
        assert_eq!(err.to_string(), "Failed to construct Article: boom");
    }

    #[test]
    fn test_domain_errors_convert() {
        let err: MapperError = DomainError::invalid_id("x").into();
        assert_eq!(err.code(), "STORE_ERROR");
        assert!(!err.is_configuration_time());
    }

    #[test]
    fn test_configuration_time_classification() {
        assert!(MapperError::configuration("A", "bad").is_configuration_time());
        assert!(MapperError::unmappable("A", "b").is_configuration_time());
        assert!(!MapperError::save("A", "b", "c", vec![]).is_configuration_time());
    }
}
