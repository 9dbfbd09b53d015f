//! Input validation for accounts, profiles, listings and chat.
//! Each validator returns the normalized value or a `VALIDATION_FAILED` error.

use uuid::Uuid;

use crate::models::{AppError, AppResult};
use crate::utils::constants::{
    user_upload_prefix, EMAIL_MAX_LEN, MAX_IMAGES_PER_LISTING, MAX_PRICE_CENTS, PASSWORD_MAX_LEN,
    PASSWORD_MIN_LEN, USERNAME_MAX_LEN, USERNAME_MIN_LEN,
};

/// Trimmed, lowercased email with one `@`, a local part and a dotted domain
pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let len = email.chars().count();

    if !(3..=EMAIL_MAX_LEN).contains(&len) {
        return Err(AppError::validation("Email must be between 3 and 254 characters"));
    }

    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return Err(AppError::validation("Email must contain exactly one '@'")),
    };

    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains(char::is_whitespace);

    if local.is_empty() || local.contains(char::is_whitespace) || !domain_ok {
        return Err(AppError::validation("Email address is not valid"));
    }

    Ok(email)
}

/// 3..=32 characters of `[A-Za-z0-9_]`; case is preserved
pub fn validate_username(raw: &str) -> AppResult<String> {
    let username = raw.trim();
    let len = username.chars().count();

    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AppError::validation(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::validation(
            "Username may only contain letters, digits and underscores",
        ));
    }

    Ok(username.to_string())
}

/// 8..=128 characters with at least one letter and one digit
pub fn validate_password(password: &str) -> AppResult<()> {
    let len = password.chars().count();

    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(AppError::validation(format!(
            "Password must be between {} and {} characters",
            PASSWORD_MIN_LEN, PASSWORD_MAX_LEN
        )));
    }
    if !password.chars().any(char::is_alphabetic) || !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::validation(
            "Password must contain at least one letter and one digit",
        ));
    }

    Ok(())
}

/// Trimmed text of `1..=max` characters
pub fn required_text(field: &str, raw: &str, max: usize) -> AppResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(AppError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(value.to_string())
}

/// Trimmed optional text; empty clears the field
pub fn optional_text(field: &str, raw: Option<&str>, max: usize) -> AppResult<Option<String>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if value.chars().count() > max => Err(AppError::validation(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        Some(value) => Ok(Some(value.to_string())),
    }
}

pub fn validate_price(price_cents: i64) -> AppResult<i64> {
    if !(0..=MAX_PRICE_CENTS).contains(&price_cents) {
        return Err(AppError::validation(format!(
            "Price must be between 0 and {} cents",
            MAX_PRICE_CENTS
        )));
    }
    Ok(price_cents)
}

/// 1..=8 distinct keys, all under the owner's upload prefix.
/// Existence in storage is checked by the caller.
pub fn validate_image_keys(owner: &Uuid, keys: &[String]) -> AppResult<Vec<String>> {
    if keys.is_empty() || keys.len() > MAX_IMAGES_PER_LISTING {
        return Err(AppError::validation(format!(
            "A listing needs between 1 and {} images",
            MAX_IMAGES_PER_LISTING
        )));
    }

    let prefix = user_upload_prefix(owner);
    let mut seen = std::collections::HashSet::new();

    for key in keys {
        if !is_owned_upload(&prefix, key) {
            return Err(AppError::validation(format!("Image '{}' is not one of your uploads", key)));
        }
        if !seen.insert(key.as_str()) {
            return Err(AppError::validation(format!("Image '{}' is listed twice", key)));
        }
    }

    Ok(keys.to_vec())
}

/// Key sits directly under `prefix` with no path tricks
pub fn is_owned_upload(prefix: &str, key: &str) -> bool {
    key.strip_prefix(prefix)
        .map_or(false, |rest| !rest.is_empty() && !rest.contains('/') && !rest.contains(".."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorCode;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM ").unwrap(), "ada@example.com");
        for bad in ["", "ada", "ada@", "@example.com", "a@b@c.com", "ada@example", "ada@.com", "a da@example.com"] {
            let err = normalize_email(bad).unwrap_err();
            assert_eq!(err.code, ErrorCode::ValidationFailed, "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_email_length_counts_characters() {
        // 161 characters but over 254 bytes
        let accented = format!("{}@example.fr", "é".repeat(150));
        assert_eq!(normalize_email(&accented).unwrap(), accented);

        let too_long = format!("{}@example.fr", "a".repeat(244));
        assert_eq!(too_long.chars().count(), 255);
        assert!(normalize_email(&too_long).is_err());
    }

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username(" Thrift_Queen ").unwrap(), "Thrift_Queen");
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
        assert!(validate_username("no spaces").is_err());
        assert!(validate_username("dash-es").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret123").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("lettersonly").is_err());
        assert!(validate_password("1234567890").is_err());
    }

    #[test]
    fn test_optional_text_clears_on_empty() {
        assert_eq!(optional_text("Bio", Some("   "), 10).unwrap(), None);
        assert_eq!(optional_text("Bio", None, 10).unwrap(), None);
        assert_eq!(optional_text("Bio", Some(" hi "), 10).unwrap(), Some("hi".to_string()));
        assert!(optional_text("Bio", Some("way too long"), 5).is_err());
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(0).is_ok());
        assert!(validate_price(MAX_PRICE_CENTS).is_ok());
        assert!(validate_price(-1).is_err());
        assert!(validate_price(MAX_PRICE_CENTS + 1).is_err());
    }

    #[test]
    fn test_validate_image_keys() {
        let owner = Uuid::new_v4();
        let prefix = user_upload_prefix(&owner);
        let a = format!("{}a.jpg", prefix);
        let b = format!("{}b.png", prefix);

        assert_eq!(validate_image_keys(&owner, &[a.clone(), b.clone()]).unwrap().len(), 2);
        assert!(validate_image_keys(&owner, &[]).is_err());
        assert!(validate_image_keys(&owner, &[a.clone(), a.clone()]).is_err());

        let foreign = format!("{}c.jpg", user_upload_prefix(&Uuid::new_v4()));
        assert!(validate_image_keys(&owner, &[foreign]).is_err());

        let nested = format!("{}../x.jpg", prefix);
        assert!(validate_image_keys(&owner, &[nested]).is_err());
    }
}
