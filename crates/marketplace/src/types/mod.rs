//! Shared types: errors, form payloads and action outcomes.

pub mod errors;
pub mod requests;

use std::fmt;

pub use errors::{ErrorCategory, MarketError, MarketResult, ProfileKind};
pub use requests::{
    AddMemberRequest, CreateListingRequest, ListingFilters, MarketplaceFilters, PriceSort,
    RegisterCooperativeRequest, SignInRequest, SubmitMineralRequest, ValidMember,
    ValidRegistration,
};

/// Confirmation shown after a successful action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice(String);

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The record an action wrote, with the confirmation to show for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome<T> {
    pub record: T,
    pub notice: Notice,
}

impl<T> ActionOutcome<T> {
    pub fn new(record: T, notice: impl Into<String>) -> Self {
        Self {
            record,
            notice: Notice::new(notice),
        }
    }
}
