//! # Input Validation Helpers
//!
//! Checks shared by signup, profile updates and file uploads.

use chrono::NaiveDate;

use crate::error::ValidationError;

/// Upload limit applied when no configuration overrides it: 5 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Extensions accepted for payment receipts and fee statements.
pub const RECEIPT_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png"];

/// Extensions accepted for general supporting documents.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "doc", "docx"];

/// Subjects recognised on academic records.
pub const SUBJECTS: &[&str] = &[
    "mathematics",
    "english",
    "kiswahili",
    "physics",
    "chemistry",
    "biology",
    "history",
    "geography",
    "cre",
    "ire",
    "hre",
    "computer",
    "business",
    "agriculture",
    "home_science",
    "art",
    "music",
    "physical_education",
    "foreign_language",
];

/// Password strength policy: at least 8 characters with upper, lower and digit.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < 8 {
        return Err(ValidationError::WeakPassword(
            "Password must be at least 8 characters long",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::WeakPassword(
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ValidationError::WeakPassword(
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::WeakPassword(
            "Password must contain at least one number",
        ));
    }
    Ok(())
}

/// Minimal structural email check: one `@`, non-empty local part, dotted domain.
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let normalized = email.trim().to_lowercase();
    let valid = match normalized.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !normalized.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(normalized)
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}

/// Require a non-blank string field, returning it trimmed.
pub fn require(field: &str, value: Option<&str>) -> Result<String, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ValidationError::MissingField(field.to_string())),
    }
}

/// Parse `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(s.to_string()))
}

/// Require a percentage in `0..=100`.
pub fn percentage(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::OutOfRange { field, value })
    }
}

/// Check an upload's size and extension. Returns the lower-cased extension.
pub fn validate_upload(
    file_name: &str,
    size: usize,
    max_bytes: usize,
    allowed: &[&str],
) -> Result<String, ValidationError> {
    if size == 0 {
        return Err(ValidationError::InvalidUpload("Uploaded file is empty".into()));
    }
    if size > max_bytes {
        return Err(ValidationError::InvalidUpload(format!(
            "File size too large. Maximum size is {}MB",
            max_bytes / (1024 * 1024)
        )));
    }
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    if !allowed.contains(&extension.as_str()) {
        return Err(ValidationError::InvalidUpload(format!(
            "File type not allowed. Allowed types: {}",
            allowed
                .iter()
                .map(|e| format!(".{e}"))
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }
    Ok(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_policy() {
        assert!(validate_password("short1A").is_err());
        assert!(validate_password("alllowercase1").is_err());
        assert!(validate_password("ALLUPPERCASE1").is_err());
        assert!(validate_password("NoDigitsHere").is_err());
        assert!(validate_password("Str0ngPass").is_ok());
    }

    #[test]
    fn email_normalized() {
        assert_eq!(
            validate_email("  Jane.Doe@Example.COM ").unwrap(),
            "jane.doe@example.com"
        );
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@@example.com").is_err());
    }

    #[test]
    fn required_field() {
        assert_eq!(require("term", Some(" Term 1 ")).unwrap(), "Term 1");
        assert_eq!(
            require("term", Some("   ")),
            Err(ValidationError::MissingField("term".into()))
        );
        assert!(require("term", None).is_err());
    }

    #[test]
    fn date_parsing() {
        assert!(parse_date("2025-01-31").is_ok());
        assert!(parse_date("31/01/2025").is_err());
    }

    #[test]
    fn upload_rules() {
        assert_eq!(
            validate_upload("Receipt.PDF", 1024, DEFAULT_MAX_UPLOAD_BYTES, RECEIPT_EXTENSIONS)
                .unwrap(),
            "pdf"
        );
        assert!(validate_upload("x.exe", 10, DEFAULT_MAX_UPLOAD_BYTES, RECEIPT_EXTENSIONS).is_err());
        assert!(validate_upload("noext", 10, DEFAULT_MAX_UPLOAD_BYTES, RECEIPT_EXTENSIONS).is_err());
        assert!(validate_upload(
            "big.png",
            DEFAULT_MAX_UPLOAD_BYTES + 1,
            DEFAULT_MAX_UPLOAD_BYTES,
            RECEIPT_EXTENSIONS
        )
        .is_err());
        assert!(validate_upload("empty.png", 0, DEFAULT_MAX_UPLOAD_BYTES, RECEIPT_EXTENSIONS).is_err());
    }

    #[test]
    fn percentage_range() {
        assert!(percentage("attendance", 101.0).is_err());
        assert!(percentage("attendance", -0.5).is_err());
        assert_eq!(percentage("attendance", 88.0).unwrap(), 88.0);
    }
}
