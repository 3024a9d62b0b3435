//! Common validation utilities.

use validator::ValidationError;

lazy_static::lazy_static! {
    static ref NAME_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 ._\-]*$").unwrap();
    static ref CRON_FIELD_REGEX: regex::Regex =
        regex::Regex::new(r"^[0-9*,/\-]+$").unwrap();
}

/// Maximum length of any entity name.
pub const MAX_NAME_LENGTH: usize = 128;

/// Validates an entity name (tags, groups, endpoints, resources).
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        let mut err = ValidationError::new("name_length");
        err.message = Some("Name must be between 1 and 128 characters".into());
        return Err(err);
    }

    if NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_name");
        err.message = Some(
            "Name may only contain alphanumeric characters, spaces, dots, hyphens and underscores"
                .into(),
        );
        Err(err)
    }
}

/// Validates a five-field cron expression (minute hour day month weekday).
pub fn validate_cron_expression(expr: &str) -> Result<(), ValidationError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() == 5 && fields.iter().all(|f| CRON_FIELD_REGEX.is_match(f)) {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_cron");
        err.message = Some("Cron expression must have five numeric or wildcard fields".into());
        Err(err)
    }
}

/// Validates a relative file path used to locate stack or script content.
///
/// Absolute paths and parent-directory components are rejected.
pub fn validate_relative_path(path: &str) -> Result<(), ValidationError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.split(['/', '\\']).any(|segment| segment == "..");

    if invalid {
        let mut err = ValidationError::new("invalid_path");
        err.message = Some("Path must be relative and may not contain '..'".into());
        Err(err)
    } else {
        Ok(())
    }
}
