//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};
use std::net::IpAddr;

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            domain: self.domain_name(),
            message: message.into(),
        }
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &'static str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid {
            domain,
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &'static str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            domain,
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate that a host names the local machine.
///
/// The worker only ever listens on loopback, so anything else is a
/// misconfiguration rather than a remote deployment.
pub fn validate_loopback_host(host: &str, field_name: &str, domain: &'static str) -> ConfigResult<()> {
    validate_required_string(host, field_name, domain)?;

    if host.eq_ignore_ascii_case("localhost") {
        return Ok(());
    }

    match host.parse::<IpAddr>() {
        Ok(ip) if ip.is_loopback() => Ok(()),
        Ok(ip) => Err(ConfigError::Invalid {
            domain,
            message: format!("{} must be a loopback address, got {}", field_name, ip),
        }),
        Err(_) => Err(ConfigError::Invalid {
            domain,
            message: format!("{} is not a valid address: {}", field_name, host),
        }),
    }
}

/// Validate enum choice
pub fn validate_enum_choice<T: AsRef<str>>(
    value: &str,
    choices: &[T],
    field_name: &str,
    domain: &'static str,
) -> ConfigResult<()> {
    if !choices.iter().any(|c| c.as_ref() == value) {
        let choices_str: Vec<&str> = choices.iter().map(|c| c.as_ref()).collect();
        return Err(ConfigError::Invalid {
            domain,
            message: format!(
                "{} must be one of: {}, got '{}'",
                field_name,
                choices_str.join(", "),
                value
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_required_string() {
        assert!(validate_required_string("test", "field", "domain").is_ok());
        assert!(validate_required_string("", "field", "domain").is_err());
        assert!(validate_required_string("   ", "field", "domain").is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1, "field", "domain").is_ok());
        assert!(validate_positive(0, "field", "domain").is_err());
        assert!(validate_positive(-1, "field", "domain").is_err());
    }

    #[test]
    fn test_validate_loopback_host() {
        assert!(validate_loopback_host("127.0.0.1", "host", "bridge").is_ok());
        assert!(validate_loopback_host("::1", "host", "bridge").is_ok());
        assert!(validate_loopback_host("localhost", "host", "bridge").is_ok());
        assert!(validate_loopback_host("10.0.0.5", "host", "bridge").is_err());
        assert!(validate_loopback_host("example.com", "host", "bridge").is_err());
        assert!(validate_loopback_host("", "host", "bridge").is_err());
    }

    #[test]
    fn test_validate_enum_choice() {
        let choices = ["text", "json"];
        assert!(validate_enum_choice("text", &choices, "format", "logging").is_ok());
        assert!(validate_enum_choice("yaml", &choices, "format", "logging").is_err());
    }
}
