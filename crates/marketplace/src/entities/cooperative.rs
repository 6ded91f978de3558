use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An organisational account that owns members.
///
/// The contact email doubles as the cooperative's lookup key: the
/// administrator signs in with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cooperative {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub registration_number: Option<String>,
    pub contact_email: String,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new cooperative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCooperative {
    pub name: String,
    pub registration_number: Option<String>,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
}
