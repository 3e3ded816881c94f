//! Field checks applied before records reach the store.

use thiserror::Error;

/// A single rejected field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

pub const NAME_MAX: usize = 128;
pub const USERNAME_MAX: usize = 16;
pub const SHELL_MAX: usize = 64;
pub const BECOME_USER_MAX: usize = 64;
pub const COMMENT_MAX: usize = 128;

/// Non-empty after trimming and at most `max` characters.
pub fn required(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    at_most(field, value, max)
}

pub fn at_most(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len > max {
        return Err(ValidationError::new(
            field,
            format!("is {len} characters, maximum is {max}"),
        ));
    }
    Ok(())
}

/// POSIX-ish login name: letters, digits, `.`, `_`, `-`; may not start with `-`.
pub fn username(value: &str) -> Result<(), ValidationError> {
    required("username", value, USERNAME_MAX)?;
    if value.starts_with('-') {
        return Err(ValidationError::new("username", "cannot start with '-'"));
    }
    if let Some(ch) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(ValidationError::new(
            "username",
            format!("invalid character '{ch}'"),
        ));
    }
    Ok(())
}
