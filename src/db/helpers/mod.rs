use std::convert::TryFrom;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn require_non_empty(value: String, field: &str) -> Result<String> {
    if value.trim().is_empty() {
        bail!("{field} is empty");
    }
    Ok(value)
}
