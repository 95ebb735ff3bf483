//! Client-side form validation.
//!
//! Validation failures never reach the network; the screen layer renders
//! them inline next to the offending field.

use playlet_api::RegisterRequest;
use std::fmt;

/// Minimum password length accepted at registration.
const MIN_PASSWORD_LEN: usize = 8;
/// Minimum username length accepted at registration.
const MIN_USERNAME_LEN: usize = 3;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The offending field name
    pub field: &'static str,
    /// User-facing message for inline rendering
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate login input. Returns all failing fields.
pub fn validate_login(username: &str, password: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if username.trim().is_empty() {
        errors.push(ValidationError {
            field: "username",
            message: "Username is required.".to_string(),
        });
    }
    if password.is_empty() {
        errors.push(ValidationError {
            field: "password",
            message: "Password is required.".to_string(),
        });
    }
    errors
}

/// Validate registration input. Returns all failing fields.
pub fn validate_registration(req: &RegisterRequest) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if req.username.trim().len() < MIN_USERNAME_LEN {
        errors.push(ValidationError {
            field: "username",
            message: format!("Username must be at least {MIN_USERNAME_LEN} characters."),
        });
    }
    if !req.email.contains('@') || req.email.trim().is_empty() {
        errors.push(ValidationError {
            field: "email",
            message: "Enter a valid email address.".to_string(),
        });
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        errors.push(ValidationError {
            field: "password",
            message: format!("Password must be at least {MIN_PASSWORD_LEN} characters."),
        });
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "longenough".to_string(),
            display_name: None,
        }
    }

    #[test]
    fn test_valid_login_passes() {
        assert!(validate_login("alice", "secret1").is_empty());
    }

    #[test]
    fn test_empty_login_fields_fail() {
        let errors = validate_login("", "");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "username");
        assert_eq!(errors[1].field, "password");
    }

    #[test]
    fn test_whitespace_username_fails() {
        let errors = validate_login("   ", "secret1");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "username");
    }

    #[test]
    fn test_valid_registration_passes() {
        assert!(validate_registration(&register_request()).is_empty());
    }

    #[test]
    fn test_short_username_fails() {
        let mut req = register_request();
        req.username = "ab".to_string();
        let errors = validate_registration(&req);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "username");
    }

    #[test]
    fn test_bad_email_fails() {
        let mut req = register_request();
        req.email = "not-an-email".to_string();
        let errors = validate_registration(&req);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "email");
    }

    #[test]
    fn test_short_password_fails() {
        let mut req = register_request();
        req.password = "short".to_string();
        let errors = validate_registration(&req);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "password");
    }

    #[test]
    fn test_multiple_failures_reported_together() {
        let req = RegisterRequest {
            username: "a".to_string(),
            email: "nope".to_string(),
            password: "x".to_string(),
            display_name: None,
        };
        assert_eq!(validate_registration(&req).len(), 3);
    }
}
