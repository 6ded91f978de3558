//! Form payloads as entered by the user.
//!
//! Fields are raw strings; `validate` turns them into typed values or a
//! `Validation` error before anything is sent to the service.

use serde::{Deserialize, Serialize};

use crate::entities::{ListingStatus, NewListing, NewSubmission};
use crate::types::MarketResult;
use crate::utils::validation::{
    optional, parse_price, parse_quantity, parse_unit, require, validate_email,
    validate_password,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterCooperativeRequest {
    pub name: String,
    pub registration_number: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub address: String,
}

/// Registration fields after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRegistration {
    pub name: String,
    pub registration_number: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl RegisterCooperativeRequest {
    pub fn validate(&self) -> MarketResult<ValidRegistration> {
        let name = require("Cooperative name", &self.name)?;
        let registration_number = require("Registration number", &self.registration_number)?;
        let email = validate_email(&self.email)?;
        validate_password(&self.password)?;

        Ok(ValidRegistration {
            name,
            registration_number,
            email,
            phone: optional(&self.phone),
            address: optional(&self.address),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

impl SignInRequest {
    /// Normalised email; the password is passed through untouched.
    pub fn validate(&self) -> MarketResult<String> {
        let email = validate_email(&self.email)?;
        require("Password", &self.password)?;
        Ok(email)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddMemberRequest {
    pub full_name: String,
    pub member_code: String,
    pub email: String,
    pub password: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidMember {
    pub full_name: String,
    pub member_code: String,
    pub email: String,
    pub phone_number: Option<String>,
}

impl AddMemberRequest {
    pub fn validate(&self) -> MarketResult<ValidMember> {
        let full_name = require("Full name", &self.full_name)?;
        let member_code = require("Member ID", &self.member_code)?;
        let email = validate_email(&self.email)?;
        validate_password(&self.password)?;

        Ok(ValidMember {
            full_name,
            member_code,
            email,
            phone_number: optional(&self.phone_number),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateListingRequest {
    pub mineral_type: String,
    pub quantity: String,
    /// Blank selects `kg`.
    pub unit: String,
    pub quality_grade: String,
    pub price_per_unit: String,
    pub notes: String,
}

impl CreateListingRequest {
    pub fn validate(&self) -> MarketResult<NewListing> {
        Ok(NewListing {
            mineral_type: require("Mineral type", &self.mineral_type)?,
            quantity: parse_quantity(&self.quantity)?,
            unit: parse_unit(&self.unit)?,
            quality_grade: require("Quality grade", &self.quality_grade)?,
            price_per_unit: parse_price(&self.price_per_unit)?,
            notes: optional(&self.notes),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitMineralRequest {
    pub listing_id: String,
    pub quantity: String,
    pub notes: String,
}

impl SubmitMineralRequest {
    pub fn validate(&self) -> MarketResult<NewSubmission> {
        Ok(NewSubmission {
            listing_id: require("Listing", &self.listing_id)?,
            quantity: parse_quantity(&self.quantity)?,
            notes: optional(&self.notes),
        })
    }
}

/// Filters of the member's listing view. Blank fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingFilters {
    /// Case-insensitive substring of the mineral type.
    pub search: String,
    pub mineral_type: String,
    pub status: Option<ListingStatus>,
}

/// Ordering of the public marketplace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSort {
    #[default]
    #[serde(rename = "price-low-high")]
    LowToHigh,
    #[serde(rename = "price-high-low")]
    HighToLow,
}

impl PriceSort {
    pub fn ascending(&self) -> bool {
        *self == PriceSort::LowToHigh
    }
}

impl From<&str> for PriceSort {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "price-high-low" | "desc" | "high" => PriceSort::HighToLow,
            _ => PriceSort::LowToHigh,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceFilters {
    pub search: String,
    pub sort: PriceSort,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::MassUnit;
    use crate::types::MarketError;

    fn listing_request() -> CreateListingRequest {
        CreateListingRequest {
            mineral_type: "Gold".to_string(),
            quantity: "100".to_string(),
            unit: String::new(),
            quality_grade: "A".to_string(),
            price_per_unit: "50".to_string(),
            notes: "  ".to_string(),
        }
    }

    #[test]
    fn test_listing_request_parses_numbers() {
        let listing = listing_request().validate().unwrap();
        assert_eq!(listing.quantity, 100.0);
        assert_eq!(listing.price_per_unit, 50.0);
        assert_eq!(listing.unit, MassUnit::Kg);
        assert_eq!(listing.notes, None);
    }

    #[test]
    fn test_listing_request_rejects_bad_numbers() {
        let mut request = listing_request();
        request.quantity = "ten".to_string();
        assert_eq!(
            request.validate().unwrap_err(),
            MarketError::Validation("Quantity must be a number".to_string())
        );

        let mut request = listing_request();
        request.price_per_unit = "-3".to_string();
        assert!(matches!(request.validate(), Err(MarketError::Validation(_))));
    }

    #[test]
    fn test_registration_requires_fields() {
        let request = RegisterCooperativeRequest {
            name: "Kivu Miners".to_string(),
            registration_number: String::new(),
            email: "a@coop.test".to_string(),
            password: "secret1".to_string(),
            ..Default::default()
        };
        assert_eq!(
            request.validate().unwrap_err().to_string(),
            "Registration number is required"
        );
    }

    #[test]
    fn test_member_request_normalises_email() {
        let request = AddMemberRequest {
            full_name: "Asha Mwangi".to_string(),
            member_code: "M-001".to_string(),
            email: " Asha@Coop.Test".to_string(),
            password: "secret1".to_string(),
            phone_number: String::new(),
        };
        let member = request.validate().unwrap();
        assert_eq!(member.email, "asha@coop.test");
        assert_eq!(member.phone_number, None);
    }

    #[test]
    fn test_price_sort_parsing() {
        assert_eq!(PriceSort::from("price-high-low"), PriceSort::HighToLow);
        assert_eq!(PriceSort::from("anything"), PriceSort::LowToHigh);
        assert!(PriceSort::default().ascending());
    }
}
