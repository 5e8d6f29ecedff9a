// Configuration validation

use crate::{ConfigError, Result};

/// Trait for validating configuration after it has been loaded
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    pub fn in_range<T: PartialOrd + std::fmt::Display>(
        value: T,
        min: T,
        max: T,
        field: &str,
    ) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between {} and {} (got {})",
                field, min, max, value
            )));
        }
        Ok(())
    }

    pub fn positive(value: u64, field: &str) -> Result<()> {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than zero",
                field
            )));
        }
        Ok(())
    }

    pub fn one_of<T: PartialEq + std::fmt::Debug>(value: &T, allowed: &[T], field: &str) -> Result<()> {
        if !allowed.contains(value) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be one of {:?}",
                field, allowed
            )));
        }
        Ok(())
    }

    pub fn lowercase(value: &str, field: &str) -> Result<()> {
        if value.chars().any(|c| c.is_uppercase()) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be lowercase (got '{}')",
                field, value
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_empty_validation() {
        assert!(ConfigValidator::not_empty("x-tenant-slug", "header_name").is_ok());
        assert!(ConfigValidator::not_empty("  ", "header_name").is_err());
    }

    #[test]
    fn test_range_validation() {
        assert!(ConfigValidator::in_range(5, 1, 10, "field").is_ok());
        assert!(ConfigValidator::in_range(0, 1, 10, "field").is_err());
        assert!(ConfigValidator::in_range(11, 1, 10, "field").is_err());
    }

    #[test]
    fn test_positive() {
        assert!(ConfigValidator::positive(1, "idle_ttl_secs").is_ok());
        assert!(ConfigValidator::positive(0, "idle_ttl_secs").is_err());
    }

    #[test]
    fn test_one_of_validation() {
        let allowed = ["live", "degraded", "auto"];
        assert!(ConfigValidator::one_of(&"auto", &allowed, "mode").is_ok());
        assert!(ConfigValidator::one_of(&"off", &allowed, "mode").is_err());
    }

    #[test]
    fn test_lowercase() {
        assert!(ConfigValidator::lowercase("www", "reserved").is_ok());
        let err = ConfigValidator::lowercase("WWW", "reserved").unwrap_err();
        assert!(err.to_string().contains("lowercase"));
    }
}
