use std::str::FromStr;

use crate::error::AppError;

pub const MAX_TURNS_LIMIT: u32 = 100;
pub const TOP_K_LIMIT: usize = 50;

/// Trims `value` and rejects it when nothing is left.
pub fn required_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Trims an optional value; blank becomes `None`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn max_turns(value: u32) -> Result<u32, AppError> {
    if (1..=MAX_TURNS_LIMIT).contains(&value) {
        Ok(value)
    } else {
        Err(AppError::Validation(format!(
            "max_turns must be between 1 and {MAX_TURNS_LIMIT}"
        )))
    }
}

pub fn weight(value: f64) -> Result<f64, AppError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(AppError::Validation(
            "weight must be a finite number of at least 0".to_string(),
        ))
    }
}

pub fn top_k(value: Option<usize>, default: usize) -> Result<usize, AppError> {
    let value = value.unwrap_or(default);
    if (1..=TOP_K_LIMIT).contains(&value) {
        Ok(value)
    } else {
        Err(AppError::Validation(format!(
            "top_k must be between 1 and {TOP_K_LIMIT}"
        )))
    }
}

/// Parses a form field that may be left blank.
pub fn parse_optional<T: FromStr>(field: &str, value: &str) -> Result<Option<T>, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| AppError::Validation(format!("{field} is not a valid number")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text_trims() {
        assert_eq!(required_text("name", "  Support ").unwrap(), "Support");
        assert!(matches!(
            required_text("name", "   "),
            Err(AppError::Validation(msg)) if msg == "name must not be empty"
        ));
        assert_eq!(optional_text(Some("  ".into())), None);
        assert_eq!(optional_text(Some(" goal ".into())).as_deref(), Some("goal"));
    }

    #[test]
    fn test_numeric_bounds() {
        assert!(max_turns(0).is_err());
        assert_eq!(max_turns(100).unwrap(), 100);
        assert!(max_turns(101).is_err());

        assert!(weight(-0.5).is_err());
        assert!(weight(f64::NAN).is_err());
        assert!(weight(f64::INFINITY).is_err());
        assert_eq!(weight(0.0).unwrap(), 0.0);

        assert_eq!(top_k(None, 5).unwrap(), 5);
        assert!(top_k(Some(0), 5).is_err());
        assert!(top_k(Some(51), 5).is_err());
    }

    #[test]
    fn test_parse_optional_form_field() {
        assert_eq!(parse_optional::<u32>("max_turns", " ").unwrap(), None);
        assert_eq!(parse_optional::<u32>("max_turns", " 12 ").unwrap(), Some(12));
        assert!(matches!(
            parse_optional::<f64>("weight", "heavy"),
            Err(AppError::Validation(msg)) if msg == "weight is not a valid number"
        ));
    }
}
