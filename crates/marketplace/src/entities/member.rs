use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An individual affiliated with a cooperative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    /// Auth identity the member signs in with.
    #[serde(default)]
    pub user_id: Option<String>,
    pub cooperative_id: String,
    pub full_name: String,
    /// Human-readable code assigned by the cooperative, unique per cooperative.
    #[serde(rename = "member_id")]
    pub member_code: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub status: MemberStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    #[default]
    Active,
    Inactive,
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemberStatus::Active => "active",
            MemberStatus::Inactive => "inactive",
        })
    }
}

/// Insert payload for a new member. Status is left to the column default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMember {
    pub user_id: String,
    pub cooperative_id: String,
    pub full_name: String,
    #[serde(rename = "member_id")]
    pub member_code: String,
    pub phone_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_member_code_uses_member_id_column() {
        let member: Member = serde_json::from_value(json!({
            "id": "m-1",
            "user_id": "u-1",
            "cooperative_id": "c-1",
            "full_name": "Asha Mwangi",
            "member_id": "M-001",
            "phone_number": "+254700000000"
        }))
        .unwrap();

        assert_eq!(member.member_code, "M-001");
        assert_eq!(member.status, MemberStatus::Active);

        let encoded = serde_json::to_value(&member).unwrap();
        assert_eq!(encoded["member_id"], json!("M-001"));
        assert_eq!(encoded["status"], json!("active"));
    }

    #[test]
    fn test_status_round_trips_lowercase() {
        let status: MemberStatus = serde_json::from_value(json!("inactive")).unwrap();
        assert_eq!(status, MemberStatus::Inactive);
        assert_eq!(status.to_string(), "inactive");
        assert!(serde_json::from_value::<MemberStatus>(json!("unknown")).is_err());
    }
}
