//! Field-level input checks for the identity endpoints.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ApiError, ApiResult};

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
const MIN_NAME_LEN: usize = 2;
const MIN_PASSWORD_LEN: usize = 6;

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(EMAIL_PATTERN).ok())
        .as_ref()
        .map_or(false, |re| re.is_match(email))
}

/// Collects every failed check into one message.
#[derive(Default)]
struct Problems(Vec<&'static str>);

impl Problems {
    fn check(&mut self, ok: bool, message: &'static str) {
        if !ok {
            self.0.push(message);
        }
    }

    fn finish(self) -> ApiResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.0.join(", ")))
        }
    }
}

pub fn validate_name(name: &str) -> ApiResult<()> {
    let mut problems = Problems::default();
    problems.check(name.trim().chars().count() >= MIN_NAME_LEN, "Name must be at least 2 characters");
    problems.finish()
}

pub fn validate_email(email: &str) -> ApiResult<()> {
    let mut problems = Problems::default();
    problems.check(is_valid_email(email), "Please provide a valid email address");
    problems.finish()
}

pub fn validate_register(name: &str, email: &str, password: &str) -> ApiResult<()> {
    let mut problems = Problems::default();
    problems.check(!name.trim().is_empty(), "Name is required");
    problems.check(
        name.trim().is_empty() || name.trim().chars().count() >= MIN_NAME_LEN,
        "Name must be at least 2 characters",
    );
    problems.check(!email.is_empty(), "Email is required");
    problems.check(
        email.is_empty() || is_valid_email(email),
        "Please provide a valid email address",
    );
    problems.check(!password.is_empty(), "Password is required");
    problems.check(
        password.is_empty() || password.chars().count() >= MIN_PASSWORD_LEN,
        "Password must be at least 6 characters",
    );
    problems.finish()
}

pub fn validate_login(email: &str, password: &str) -> ApiResult<()> {
    let mut problems = Problems::default();
    problems.check(!email.is_empty(), "Email is required");
    problems.check(!password.is_empty(), "Password is required");
    problems.finish()
}

pub fn validate_password_change(current: &str, new: &str) -> ApiResult<()> {
    let mut problems = Problems::default();
    problems.check(!current.is_empty(), "Current password is required");
    problems.check(!new.is_empty(), "New password is required");
    problems.check(
        new.is_empty() || new.chars().count() >= MIN_PASSWORD_LEN,
        "New password must be at least 6 characters",
    );
    problems.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(is_valid_email("ada@example.com"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada example@x.io"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn register_reports_every_problem() {
        let err = validate_register("A", "nope", "123").unwrap_err();
        let ApiError::Validation(message) = err else {
            panic!("expected a validation error");
        };
        assert!(message.contains("Name must be at least 2 characters"));
        assert!(message.contains("valid email"));
        assert!(message.contains("Password must be at least 6"));

        assert!(validate_register("Ada", "ada@example.com", "secret1").is_ok());
    }

    #[test]
    fn password_change_needs_both_fields() {
        assert!(validate_password_change("", "newpass").is_err());
        assert!(validate_password_change("old", "short").is_err());
        assert!(validate_password_change("old", "longenough").is_ok());
    }
}
