use regex::Regex;

use crate::shared::errors::{AppError, AppResult};

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z0-9._:\-]+$";
const MAX_IDENTIFIER_LEN: usize = 128;

pub struct Validator;

impl Validator {
    /// Record and user identifiers are opaque but must be safe to log and put in URLs
    pub fn validate_identifier(field: &str, value: &str) -> AppResult<()> {
        if value.trim().is_empty() {
            return Err(AppError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        if value.len() > MAX_IDENTIFIER_LEN {
            return Err(AppError::ValidationError(format!(
                "{} too long (max {} characters)",
                field, MAX_IDENTIFIER_LEN
            )));
        }

        let re = Regex::new(IDENTIFIER_PATTERN)
            .map_err(|e| AppError::InternalError(format!("Invalid identifier pattern: {}", e)))?;
        if !re.is_match(value) {
            return Err(AppError::ValidationError(format!(
                "{} contains invalid characters",
                field
            )));
        }
        Ok(())
    }

    pub fn validate_record_id(record_id: &str) -> AppResult<()> {
        Self::validate_identifier("recordId", record_id)
    }

    pub fn validate_user_id(user_id: &str) -> AppResult<()> {
        Self::validate_identifier("userId", user_id)
    }

    pub fn validate_item_id(item_id: &str) -> AppResult<uuid::Uuid> {
        Ok(uuid::Uuid::parse_str(item_id.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_typical_identifiers() {
        assert!(Validator::validate_record_id("opp-2024_001").is_ok());
        assert!(Validator::validate_record_id("sam.gov:W912").is_ok());
        assert!(Validator::validate_user_id("42").is_ok());
    }

    #[test]
    fn test_rejects_empty_and_whitespace() {
        assert!(Validator::validate_record_id("").is_err());
        assert!(Validator::validate_user_id("   ").is_err());
    }

    #[test]
    fn test_rejects_unsafe_characters() {
        let err = Validator::validate_record_id("opp/../1").unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn test_rejects_overlong_identifier() {
        let long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(Validator::validate_record_id(&long).is_err());
    }

    #[test]
    fn test_item_id_must_be_uuid() {
        assert!(Validator::validate_item_id("not-a-uuid").is_err());
        let id = uuid::Uuid::new_v4();
        assert_eq!(Validator::validate_item_id(&id.to_string()).unwrap(), id);
    }
}
