//! Error types for Ember

use thiserror::Error;

/// The main error type for Ember operations
#[derive(Debug, Error)]
pub enum EmberError {
    #[error("Unknown particle group: {0}")]
    UnknownGroup(String),

    #[error("Duplicate particle group: {0}")]
    DuplicateGroup(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("Value out of range: {field} must be between {min} and {max}, got {value}")]
    ValueOutOfRange {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("Invalid enum value: {value} is not one of {allowed:?}")]
    InvalidEnumValue {
        value: String,
        allowed: Vec<String>,
    },

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

/// Result type alias for Ember operations
pub type Result<T> = std::result::Result<T, EmberError>;

impl From<toml::de::Error> for EmberError {
    fn from(err: toml::de::Error) -> Self {
        EmberError::TomlParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_errors_convert() {
        let err: EmberError = toml::from_str::<toml::Value>("= broken")
            .unwrap_err()
            .into();
        assert!(matches!(err, EmberError::TomlParseError(_)));
    }

    #[test]
    fn out_of_range_message() {
        let err = EmberError::ValueOutOfRange {
            field: "emit_rate".into(),
            min: 0.0,
            max: 1000.0,
            value: -1.0,
        };
        assert_eq!(
            err.to_string(),
            "Value out of range: emit_rate must be between 0 and 1000, got -1"
        );
    }
}
