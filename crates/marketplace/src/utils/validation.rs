//! Input validation for form payloads.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::entities::MassUnit;
use crate::types::{MarketError, MarketResult};

/// Minimum password length accepted by the auth service.
pub const MIN_PASSWORD_LENGTH: usize = 6;

static EMAIL_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());

/// Trimmed value of a required field.
pub fn require(field: &str, value: &str) -> MarketResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MarketError::required(field));
    }
    Ok(value.to_string())
}

/// Trimmed value of an optional field; blank becomes `None`.
pub fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Normalised (trimmed, lowercased) email address.
pub fn validate_email(email: &str) -> MarketResult<String> {
    let email = require("Email", email)?.to_lowercase();
    let valid = EMAIL_REGEX
        .as_ref()
        .is_some_and(|regex| regex.is_match(&email));

    if !valid || email.len() > 255 {
        return Err(MarketError::Validation("Invalid email format".to_string()));
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> MarketResult<()> {
    if password.is_empty() {
        return Err(MarketError::required("Password"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(MarketError::Validation(format!(
            "Password should be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn parse_number(field: &str, raw: &str) -> MarketResult<f64> {
    let raw = require(field, raw)?;
    raw.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| MarketError::Validation(format!("{field} must be a number")))
}

/// Quantities must be finite and strictly positive.
pub fn parse_quantity(raw: &str) -> MarketResult<f64> {
    let quantity = parse_number("Quantity", raw)?;
    if quantity <= 0.0 {
        return Err(MarketError::Validation(
            "Quantity must be greater than zero".to_string(),
        ));
    }
    Ok(quantity)
}

/// Prices must be finite and not negative.
pub fn parse_price(raw: &str) -> MarketResult<f64> {
    let price = parse_number("Price per unit", raw)?;
    if price < 0.0 {
        return Err(MarketError::Validation(
            "Price per unit cannot be negative".to_string(),
        ));
    }
    Ok(price)
}

/// Blank means the default unit, `kg`.
pub fn parse_unit(raw: &str) -> MarketResult<MassUnit> {
    if raw.trim().is_empty() {
        return Ok(MassUnit::default());
    }
    MassUnit::parse(raw).ok_or_else(|| {
        MarketError::Validation("Unit must be one of kg, g, ton".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_trims() {
        assert_eq!(require("Name", "  Kivu ").unwrap(), "Kivu");
        assert_eq!(
            require("Name", "   ").unwrap_err().to_string(),
            "Name is required"
        );
        assert_eq!(optional("  "), None);
        assert_eq!(optional(" 0700 "), Some("0700".to_string()));
    }

    #[test]
    fn test_email() {
        assert_eq!(validate_email(" A@Coop.Test ").unwrap(), "a@coop.test");
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@coop").is_err());
        assert_eq!(
            validate_email("").unwrap_err(),
            MarketError::Validation("Email is required".to_string())
        );
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("secret").is_ok());
        assert_eq!(
            validate_password("12345").unwrap_err().to_string(),
            "Password should be at least 6 characters"
        );
    }

    #[test]
    fn test_quantity_rejects_non_numeric_and_non_positive() {
        assert_eq!(parse_quantity(" 10.5 ").unwrap(), 10.5);
        for bad in ["abc", "NaN", "inf", "-1", "0", ""] {
            assert!(
                matches!(parse_quantity(bad), Err(MarketError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_price_allows_zero() {
        assert_eq!(parse_price("0").unwrap(), 0.0);
        assert_eq!(parse_price("50").unwrap(), 50.0);
        assert!(parse_price("-0.01").is_err());
        assert!(parse_price("fifty").is_err());
    }

    #[test]
    fn test_unit_defaults_to_kg() {
        assert_eq!(parse_unit("").unwrap(), MassUnit::Kg);
        assert_eq!(parse_unit("ton").unwrap(), MassUnit::Ton);
        assert!(parse_unit("ounce").is_err());
    }
}
