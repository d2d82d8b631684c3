//! Input validation utilities

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ApiError;

/// A field that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.reason)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

/// Turns a raw payload into its checked form
pub trait Validate {
    type Valid;

    fn validate(self) -> Result<Self::Valid, ValidationError>;
}

pub const EMAIL_MAX_LEN: usize = 30;
pub const NAME_MAX_LEN: usize = 20;
pub const USERNAME_MAX_LEN: usize = 20;
pub const PASSWORD_MIN_LEN: usize = 6;

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    })
}

fn username_regex() -> &'static Regex {
    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    USERNAME_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_-]{2,20}$").expect("Failed to compile username regex")
    })
}

fn slug_regex() -> &'static Regex {
    static SLUG_REGEX: OnceLock<Regex> = OnceLock::new();
    SLUG_REGEX.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Failed to compile slug regex"))
}

/// Take a required string field, rejecting missing and blank values
pub fn required(field: &'static str, value: Option<String>) -> Result<String, ValidationError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ValidationError::new(field, "should not be empty")),
    }
}

/// Lowercase and trim an email, then check its shape
pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::new("email", "should not be empty"));
    }
    if email.chars().count() > EMAIL_MAX_LEN {
        return Err(ValidationError::new(
            "email",
            format!("must be at most {} characters long", EMAIL_MAX_LEN),
        ));
    }
    if !email_regex().is_match(&email) {
        return Err(ValidationError::new("email", "must be an email"));
    }
    Ok(email)
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if !username_regex().is_match(username) {
        return Err(ValidationError::new(
            "username",
            "must be 2 to 20 letters, numbers, underscores or hyphens",
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(ValidationError::new(
            "password",
            format!("must be at least {} characters long", PASSWORD_MIN_LEN),
        ));
    }
    Ok(())
}

pub fn validate_name(field: &'static str, name: &str) -> Result<(), ValidationError> {
    if name.chars().count() > NAME_MAX_LEN {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters long", NAME_MAX_LEN),
        ));
    }
    Ok(())
}

pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if !slug_regex().is_match(slug) {
        return Err(ValidationError::new(
            "slug",
            "can only contain letters, numbers, underscores and hyphens",
        ));
    }
    Ok(())
}

/// Username derived from the local part of an email
pub fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let mut username: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(USERNAME_MAX_LEN)
        .collect();
    while username.chars().count() < 2 {
        username.push('_');
    }
    username
}
