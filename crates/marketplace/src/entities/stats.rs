//! Aggregates returned by the statistics procedures.
//!
//! Procedures return a single-row set whose numeric columns may arrive as
//! JSON numbers or as numeric strings; anything unreadable counts as zero.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberStats {
    pub total_listings: u64,
    pub total_submissions: u64,
    pub total_quantity: f64,
}

impl MemberStats {
    pub fn from_rpc(value: &Value) -> Self {
        let row = first_row(value);
        Self {
            total_listings: count_field(row, "total_listings"),
            total_submissions: count_field(row, "total_submissions"),
            total_quantity: number_field(row, "total_quantity"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CooperativeStats {
    pub total_members: u64,
    pub total_submissions: u64,
    pub total_quantity: f64,
}

impl CooperativeStats {
    /// Combine the member count with the `get_cooperative_totals` result.
    pub fn from_rpc(total_members: u64, totals: &Value) -> Self {
        let row = first_row(totals);
        Self {
            total_members,
            total_submissions: count_field(row, "total_submissions"),
            total_quantity: number_field(row, "total_quantity"),
        }
    }
}

fn first_row(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(rows) => rows.first(),
        Value::Null => None,
        other => Some(other),
    }
}

fn number_field(row: Option<&Value>, key: &str) -> f64 {
    let parsed = match row.and_then(|r| r.get(key)) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
}

fn count_field(row: Option<&Value>, key: &str) -> u64 {
    let n = number_field(row, key);
    if n > 0.0 {
        n as u64
    } else {
        0
    }
}
