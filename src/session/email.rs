use std::sync::OnceLock;

use regex::Regex;

use crate::error::ValidationError;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@ \t\r\n]+@[^@ \t\r\n]+\.[^@ \t\r\n]+$")
            .expect("email pattern is a valid regex")
    })
}

/// Shape check only; nothing is verified beyond `local@domain.tld`.
pub fn email_is_valid(email: &str) -> bool {
    email_pattern().is_match(email)
}

/// Trim and check an email typed by the user.
pub fn validate_email(input: &str) -> Result<String, ValidationError> {
    let email = input.trim();
    if email.is_empty() || !email_is_valid(email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(email.to_string())
}
