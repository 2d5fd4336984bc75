use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single (voter, apartment owner) vote. At most one exists per pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub id: i64,
    pub voter_email: String,
    pub apartment_email: String,
    pub created_at: DateTime<Utc>,
}
