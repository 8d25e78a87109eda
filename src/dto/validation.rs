//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a team color is a `#RRGGBB` hexadecimal string.
///
/// # Examples
///
/// ```ignore
/// validate_hex_color("#4F46E5") // Ok
/// validate_hex_color("4F46E5")  // Err - missing '#'
/// validate_hex_color("#4F46E")  // Err - too short
/// ```
pub fn validate_hex_color(color: &str) -> Result<(), ValidationError> {
    let Some(digits) = color.strip_prefix('#') else {
        let mut err = ValidationError::new("color_prefix");
        err.message = Some("Color must start with '#'".into());
        return Err(err);
    };

    if digits.len() != 6 {
        let mut err = ValidationError::new("color_length");
        err.message =
            Some(format!("Color must have exactly 6 hex digits (got {})", digits.len()).into());
        return Err(err);
    }

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut err = ValidationError::new("color_format");
        err.message = Some("Color must contain only hexadecimal digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a free-text field is not only whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_hex_color_valid() {
        assert!(validate_hex_color("#4F46E5").is_ok());
        assert!(validate_hex_color("#e11d48").is_ok());
        assert!(validate_hex_color("#000000").is_ok());
    }

    #[test]
    fn test_validate_hex_color_invalid() {
        assert!(validate_hex_color("4F46E5").is_err()); // no prefix
        assert!(validate_hex_color("#4F46E").is_err()); // too short
        assert!(validate_hex_color("#4F46E5A").is_err()); // too long
        assert!(validate_hex_color("#4G46E5").is_err()); // invalid hex
    }

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("Falcons").is_ok());
        assert!(validate_not_blank("   ").is_err());
        assert!(validate_not_blank("").is_err());
    }
}
