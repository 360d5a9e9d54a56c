use std::collections::HashMap;

use http::{HeaderName, HeaderValue};

use crate::config::models::{ClientConfig, RootRule};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Client configuration validator
pub struct ClientConfigValidator;

impl ClientConfigValidator {
    /// Validate the entire client configuration, reporting every problem found
    pub fn validate(config: &ClientConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.default_root.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "default_root".to_string(),
            });
        } else if let Err(e) = Self::validate_url(&config.default_root, "default_root") {
            errors.push(e);
        }

        for (i, rule) in config.roots.iter().enumerate() {
            if let Err(mut rule_errors) = Self::validate_root_rule(i, rule) {
                errors.append(&mut rule_errors);
            }
        }

        if config.timeout_ms == 0 {
            errors.push(ValidationError::InvalidField {
                field: "timeout_ms".to_string(),
                message: "Timeout must be greater than 0".to_string(),
            });
        }

        if let Err(mut code_errors) = Self::validate_success_codes(&config.success_codes) {
            errors.append(&mut code_errors);
        }

        if let Err(mut header_errors) = Self::validate_headers(&config.default_headers) {
            errors.append(&mut header_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_root_rule(index: usize, rule: &RootRule) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let field = format!("roots[{index}]");

        if rule.prefix.is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("{field}.prefix"),
            });
        } else if !rule.prefix.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("{field}.prefix"),
                message: format!("Prefix '{}' must start with '/'", rule.prefix),
            });
        }

        if let Err(e) = Self::validate_url(&rule.root, &format!("{field}.root")) {
            errors.push(e);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_success_codes(codes: &[u16]) -> Result<(), Vec<ValidationError>> {
        if codes.is_empty() {
            return Err(vec![ValidationError::MissingField {
                field: "success_codes".to_string(),
            }]);
        }

        let errors: Vec<_> = codes
            .iter()
            .filter(|code| !(100..=599).contains(*code))
            .map(|code| ValidationError::InvalidField {
                field: "success_codes".to_string(),
                message: format!("{code} is not an HTTP status code"),
            })
            .collect();

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_headers(headers: &HashMap<String, String>) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        for (name, value) in headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: format!("default_headers.{name}"),
                    message: "Invalid header name".to_string(),
                });
            }
            if HeaderValue::from_str(value).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: format!("default_headers.{name}"),
                    message: "Invalid header value".to_string(),
                });
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Validate an absolute http(s) URL
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
