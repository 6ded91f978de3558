use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An offer of a quantity of a mineral at a price, owned by a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineralListing {
    pub id: String,
    pub member_id: String,
    pub mineral_type: String,
    pub quantity: f64,
    pub unit: String,
    #[serde(default)]
    pub quality_grade: Option<String>,
    pub price_per_unit: f64,
    #[serde(default)]
    pub status: ListingStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl MineralListing {
    /// Submissions can only be made against available listings.
    pub fn accepts_submissions(&self) -> bool {
        self.status == ListingStatus::Available
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Available,
    Pending,
    Sold,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Available => "available",
            ListingStatus::Pending => "pending",
            ListingStatus::Sold => "sold",
        }
    }

    /// Strict parse for user-supplied filters.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "available" => Some(ListingStatus::Available),
            "pending" => Some(ListingStatus::Pending),
            "sold" => Some(ListingStatus::Sold),
            _ => None,
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Units a listing quantity may be expressed in.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MassUnit {
    #[default]
    Kg,
    G,
    Ton,
}

impl MassUnit {
    pub const ALL: [MassUnit; 3] = [MassUnit::Kg, MassUnit::G, MassUnit::Ton];

    pub fn as_str(&self) -> &'static str {
        match self {
            MassUnit::Kg => "kg",
            MassUnit::G => "g",
            MassUnit::Ton => "ton",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|unit| unit.as_str() == s)
    }
}

impl fmt::Display for MassUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated listing fields, ready to be written for a member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewListing {
    pub mineral_type: String,
    pub quantity: f64,
    pub unit: MassUnit,
    pub quality_grade: String,
    pub price_per_unit: f64,
    pub notes: Option<String>,
}
