use crate::config::Config;
use crate::error::ConfigError;

/// Validate a [`Config`], returning all detected violations.
///
/// Returns `Ok(())` when the config is valid, or `Err` with a
/// vector of every validation error found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.debugger.path.trim().is_empty() {
        errors.push(invalid("debugger.path", "must not be empty".to_string()));
    }

    if config.timeouts.default_ms == 0 {
        errors.push(invalid(
            "timeouts.default_ms",
            "must be greater than 0".to_string(),
        ));
    }

    if config.timeouts.extended_ms < config.timeouts.default_ms {
        errors.push(invalid(
            "timeouts.extended_ms",
            format!(
                "must be at least timeouts.default_ms ({}), got {}",
                config.timeouts.default_ms, config.timeouts.extended_ms,
            ),
        ));
    }

    if config.target.tool.trim().is_empty() {
        errors.push(invalid("target.tool", "must not be empty".to_string()));
    }

    for (i, entry) in config.target.options.iter().enumerate() {
        if entry.key.is_empty() || entry.key.chars().any(char::is_whitespace) {
            errors.push(invalid(
                &format!("target.options[{i}].key"),
                format!("must be a single word, got {:?}", entry.key),
            ));
        }
        // A line break would smuggle a second command to the console.
        if entry.value.contains(['\r', '\n']) {
            errors.push(invalid(
                &format!("target.options[{i}].value"),
                "must not contain line breaks".to_string(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message,
    }
}
