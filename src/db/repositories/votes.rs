use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};

use crate::db::{
    helpers::parse_datetime,
    models::VoteRecord,
    Database,
};

fn row_to_vote(row: &Row) -> Result<VoteRecord> {
    let created_at: String = row.get("created_at")?;

    Ok(VoteRecord {
        id: row.get("id")?,
        voter_email: row.get("voter_email")?,
        apartment_email: row.get("apartment_email")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Record a vote. Fails on a duplicate (voter, apartment) pair or when
    /// the apartment does not exist.
    pub async fn insert_vote(&self, voter_email: &str, apartment_email: &str) -> Result<VoteRecord> {
        let voter_email = voter_email.to_string();
        let apartment_email = apartment_email.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO apartment_votes (voter_email, apartment_email, created_at)
                 VALUES (?1, ?2, ?3)",
                params![voter_email, apartment_email, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to record vote from {voter_email} for {apartment_email}"))?;

            let vote_id = conn.last_insert_rowid();
            let mut stmt = conn.prepare(
                "SELECT id, voter_email, apartment_email, created_at
                 FROM apartment_votes
                 WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![vote_id])?;
            match rows.next()? {
                Some(row) => row_to_vote(row),
                None => Err(anyhow!("vote not found after insert")),
            }
        })
        .await
    }

    /// Delete the matching vote. Returns whether a row was removed.
    pub async fn delete_vote(&self, voter_email: &str, apartment_email: &str) -> Result<bool> {
        let voter_email = voter_email.to_string();
        let apartment_email = apartment_email.to_string();
        self.execute(move |conn| {
            let rows_affected = conn
                .execute(
                    "DELETE FROM apartment_votes
                     WHERE voter_email = ?1 AND apartment_email = ?2",
                    params![voter_email, apartment_email],
                )
                .with_context(|| "failed to remove vote")?;
            Ok(rows_affected > 0)
        })
        .await
    }

    /// Owner emails the voter currently has a vote for.
    pub async fn list_votes_by_voter(&self, voter_email: &str) -> Result<Vec<String>> {
        let voter_email = voter_email.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT apartment_email FROM apartment_votes
                 WHERE voter_email = ?1
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query(params![voter_email])?;
            let mut owners = Vec::new();
            while let Some(row) = rows.next()? {
                owners.push(row.get::<_, String>(0)?);
            }
            Ok(owners)
        })
        .await
    }
}
