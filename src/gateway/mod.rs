//! Access to the apartment/vote store.
//!
//! [`ApartmentGateway`] is the only seam through which the rest of the crate
//! reaches persisted data. Every call either fully applies or returns an
//! error; no call retries.

use std::future::Future;

use anyhow::Result;

use crate::db::{ApartmentChoice, ApartmentListing, VoteRecord};

#[cfg(test)]
pub mod fake;
pub mod feed;
mod sqlite;

pub use feed::{ChangeFeed, ListingSnapshot, Subscription};
pub use sqlite::SqliteGateway;

pub trait ApartmentGateway: Send + Sync {
    /// Create or overwrite the apartment owned by `email`.
    fn upsert_apartment(
        &self,
        email: &str,
        choice: &ApartmentChoice,
    ) -> impl Future<Output = Result<ApartmentListing>> + Send;

    /// Every listing, ordered by vote count descending.
    fn list_apartments(&self) -> impl Future<Output = Result<Vec<ApartmentListing>>> + Send;

    /// Insert a vote record. Fails if the pair already exists.
    fn add_vote(
        &self,
        voter_email: &str,
        owner_email: &str,
    ) -> impl Future<Output = Result<VoteRecord>> + Send;

    /// Delete a vote record. Succeeds when there was nothing to delete.
    fn remove_vote(
        &self,
        voter_email: &str,
        owner_email: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Owners the voter currently has an active vote for.
    fn list_votes_by_voter(
        &self,
        voter_email: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Listen for listing changes. Each message is the full refreshed set.
    fn subscribe(&self) -> Subscription;
}
