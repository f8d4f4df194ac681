//! Error types for option parsing and profile loading.

/// Errors that can occur when parsing compiler options or loading `kiln.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the profile.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// An option string names no known option.
    #[error("unknown option '{0}'")]
    UnknownOption(String),

    /// An option was given a value it cannot take.
    #[error("invalid value '{value}' for option '{option}': {reason}")]
    InvalidValue {
        /// Option name without the leading dashes.
        option: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_option() {
        let err = ConfigError::UnknownOption("-frobnicate".to_string());
        assert_eq!(format!("{err}"), "unknown option '-frobnicate'");
    }

    #[test]
    fn display_invalid_value() {
        let err = ConfigError::InvalidValue {
            option: "subgroup-size".to_string(),
            value: "abc".to_string(),
            reason: "expected an unsigned integer".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "invalid value 'abc' for option 'subgroup-size': expected an unsigned integer"
        );
    }

    #[test]
    fn display_parse_error() {
        let err = ConfigError::ParseError("expected '=' at line 3".to_string());
        assert_eq!(
            format!("{err}"),
            "failed to parse configuration: expected '=' at line 3"
        );
    }

    #[test]
    fn display_validation_error() {
        let err = ConfigError::ValidationError("cache.mode must be 0..=4".to_string());
        assert_eq!(format!("{err}"), "validation error: cache.mode must be 0..=4");
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::IoError(io_err);
        assert!(format!("{err}").starts_with("failed to read configuration:"));
    }
}
