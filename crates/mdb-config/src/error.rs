use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while locating, loading or validating the
/// configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    /// Failed to create the default config file.
    #[error("failed to create default config: {0}")]
    CreateDefault(String),

    /// TOML parsing failed.
    #[error("TOML parse error: {0}")]
    Parse(String),

    /// A config value failed validation.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// The dotted field path (e.g. `timeouts.default_ms`).
        field: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// A standard directory could not be resolved.
    #[error("path error: {0}")]
    Path(String),

    /// An I/O error occurred while reading or writing config files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_contains_path() {
        let err = ConfigError::NotFound(PathBuf::from("/tmp/missing.toml"));
        let msg = format!("{err}");
        assert!(msg.contains("/tmp/missing.toml"));
        assert!(msg.contains("config file not found"));
    }

    #[test]
    fn parse_display_contains_details() {
        let err = ConfigError::Parse("unexpected `=`".into());
        assert!(format!("{err}").contains("TOML parse error"));
    }

    #[test]
    fn validation_display_contains_field_and_message() {
        let err = ConfigError::Validation {
            field: "timeouts.extended_ms".into(),
            message: "must be at least timeouts.default_ms".into(),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("validation error: timeouts.extended_ms"));
    }

    #[test]
    fn path_display() {
        let err = ConfigError::Path("could not determine home directory".into());
        assert_eq!(
            err.to_string(),
            "path error: could not determine home directory"
        );
    }

    #[test]
    fn io_error_display_contains_inner() {
        let inner = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = ConfigError::from(inner);
        assert!(format!("{err}").contains("read-only"));
    }
}
