//! Apartment listing data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The customization a voter picks for their apartment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApartmentChoice {
    pub left_wall_color: String,
    pub right_wall_color: String,
    pub sofa: String,
    pub mirror: String,
}

/// One row of the `apartments` table: a voter's customization plus its
/// aggregate vote count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApartmentListing {
    pub id: i64,
    pub email: String,
    pub left_wall_color: String,
    pub right_wall_color: String,
    pub sofa: String,
    pub mirror: String,
    pub votes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
