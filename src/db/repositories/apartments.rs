use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::warn;
use rusqlite::{params, Connection, Row};

use crate::db::{
    helpers::{parse_datetime, require_non_empty, to_u64},
    models::{ApartmentChoice, ApartmentListing},
    Database,
};

const LISTING_COLUMNS: &str = "id, email, left_wall_color, right_wall_color, selected_sofa, \
     selected_mirror, votes, created_at, updated_at";

fn row_to_listing(row: &Row) -> Result<ApartmentListing> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(ApartmentListing {
        id: row.get("id")?,
        email: require_non_empty(row.get("email")?, "email")?,
        left_wall_color: row.get("left_wall_color")?,
        right_wall_color: row.get("right_wall_color")?,
        sofa: row.get("selected_sofa")?,
        mirror: row.get("selected_mirror")?,
        votes: to_u64(row.get("votes")?, "votes")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn select_listings(conn: &Connection) -> Result<Vec<ApartmentListing>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LISTING_COLUMNS} FROM apartments ORDER BY votes DESC, id ASC"
    ))?;

    let mut rows = stmt.query([])?;
    let mut listings = Vec::new();
    while let Some(row) = rows.next()? {
        // A bad row is dropped here so it never reaches the vote engine.
        match row_to_listing(row) {
            Ok(listing) => listings.push(listing),
            Err(err) => {
                let id: Option<i64> = row.get("id").ok();
                warn!("Skipping malformed apartment row {id:?}: {err:#}");
            }
        }
    }

    Ok(listings)
}

fn select_listing(conn: &Connection, email: &str) -> Result<Option<ApartmentListing>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LISTING_COLUMNS} FROM apartments WHERE email = ?1"
    ))?;
    let mut rows = stmt.query(params![email])?;
    match rows.next()? {
        Some(row) => row_to_listing(row).map(Some),
        None => Ok(None),
    }
}

impl Database {
    /// Insert or overwrite the apartment keyed by `email`.
    /// Votes and `created_at` survive an overwrite.
    pub async fn upsert_apartment(
        &self,
        email: &str,
        choice: &ApartmentChoice,
    ) -> Result<ApartmentListing> {
        let email = email.to_string();
        let choice = choice.clone();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO apartments
                     (email, left_wall_color, right_wall_color, selected_sofa, selected_mirror, votes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
                 ON CONFLICT(email) DO UPDATE SET
                     left_wall_color = excluded.left_wall_color,
                     right_wall_color = excluded.right_wall_color,
                     selected_sofa = excluded.selected_sofa,
                     selected_mirror = excluded.selected_mirror,
                     updated_at = excluded.updated_at",
                params![
                    email,
                    choice.left_wall_color,
                    choice.right_wall_color,
                    choice.sofa,
                    choice.mirror,
                    now,
                ],
            )
            .with_context(|| format!("failed to upsert apartment for {email}"))?;

            select_listing(conn, &email)?
                .ok_or_else(|| anyhow!("apartment for {email} not found after upsert"))
        })
        .await
    }

    /// All listings, most voted first.
    pub async fn list_apartments(&self) -> Result<Vec<ApartmentListing>> {
        self.execute(|conn| select_listings(conn)).await
    }

    pub async fn get_apartment(&self, email: &str) -> Result<Option<ApartmentListing>> {
        let email = email.to_string();
        self.execute(move |conn| select_listing(conn, &email)).await
    }
}
