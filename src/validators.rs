/// Input validators applied at the HTTP edge before a request reaches the
/// credential service.
/// 1. Length limits on every field
/// 2. Email format check
/// 3. Password strength rules
/// 4. Control characters and SQL injection patterns in names

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_NAME_LENGTH: usize = 100;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    static ref SQL_INJECTION_PATTERNS: [Regex; 4] = [
        Regex::new(r"(?i)\s+UNION\s+").unwrap(),
        Regex::new(r"(--|;|/\*|\*/)").unwrap(),
        Regex::new(r"(?i);\s*(INSERT|UPDATE|DELETE|DROP|CREATE|ALTER)").unwrap(),
        Regex::new(r"(?i)(SLEEP|WAITFOR|BENCHMARK)\s*\(").unwrap(),
    ];
}

/// Validates an email address and returns it trimmed.
///
/// Case is preserved: emails are unique as stored.
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if trimmed.contains('\0') || trimmed.matches('@').count() != 1 {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a personal name field (`name`, `lastName`)
pub fn is_valid_name(field: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }

    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong(field.to_string(), MAX_NAME_LENGTH));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent(field.to_string()));
    }

    if SQL_INJECTION_PATTERNS.iter().any(|pattern| pattern.is_match(trimmed)) {
        return Err(ValidationError::PossibleSQLInjection);
    }

    Ok(trimmed.to_string())
}

/// Password strength requirements:
/// - 8 to 128 characters
/// - at least one uppercase and one lowercase letter
/// - at least one digit or special character
pub fn is_valid_password(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    // DoS prevention: argon2 input is unbounded otherwise
    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }

    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_digit_or_symbol = password
        .chars()
        .any(|c| c.is_numeric() || (!c.is_alphanumeric() && !c.is_whitespace()));

    if !has_uppercase || !has_lowercase || !has_digit_or_symbol {
        return Err(ValidationError::InvalidFormat(
            "password must contain an uppercase letter, a lowercase letter, and a digit or symbol"
                .to_string(),
        ));
    }

    Ok(())
}

/// Login only bounds the password; strength rules apply to new passwords
pub fn is_present_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()));
    }
    if password.chars().count() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com").is_ok());
        assert!(is_valid_email("test.email@domain.co.uk").is_ok());
        assert!(is_valid_email("user+tag@example.com").is_ok());
    }

    #[test]
    fn test_email_case_is_preserved() {
        assert_eq!(is_valid_email("  John@Example.com ").unwrap(), "John@Example.com");
    }

    #[test]
    fn test_invalid_email_format() {
        assert!(is_valid_email("invalid").is_err());
        assert!(is_valid_email("user@").is_err());
        assert!(is_valid_email("@example.com").is_err());
        assert!(is_valid_email("user@@example.com").is_err());
    }

    #[test]
    fn test_email_length_limits() {
        let too_long = format!("{}@example.com", "a".repeat(250));
        assert!(is_valid_email(&too_long).is_err());
        assert!(is_valid_email("a@b").is_err());
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("name", "John").is_ok());
        assert!(is_valid_name("lastName", "Jean-Pierre").is_ok());
        assert!(is_valid_name("lastName", "O'Brien").is_ok());
    }

    #[test]
    fn test_name_limits() {
        assert!(is_valid_name("name", "").is_err());
        assert!(is_valid_name("name", &"a".repeat(101)).is_err());
        assert!(is_valid_name("name", "Name\0with\0null").is_err());
    }

    #[test]
    fn test_sql_injection_in_name() {
        assert!(is_valid_name("name", "John'; DROP TABLE users--").is_err());
        assert!(is_valid_name("name", "Name UNION SELECT *").is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(is_valid_password("StrongP@ss").is_ok());
        assert!(is_valid_password("SecurePass123").is_ok());
        assert!(is_valid_password("Short1").is_err());
        assert!(is_valid_password("nouppercase123").is_err());
        assert!(is_valid_password("NOLOWERCASE123").is_err());
        assert!(is_valid_password("NoDigitsHere").is_err());
        assert!(is_valid_password(&format!("Aa1{}", "a".repeat(200))).is_err());
    }

    #[test]
    fn test_login_password_presence() {
        assert!(is_present_password("").is_err());
        assert!(is_present_password("anything").is_ok());
    }
}
