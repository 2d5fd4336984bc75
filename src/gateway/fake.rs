//! In-memory gateway for tests, with failure injection and call gating.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use tokio::sync::{Notify, Semaphore};

use crate::db::{ApartmentChoice, ApartmentListing, VoteRecord};

use super::{ApartmentGateway, ChangeFeed, Subscription};

#[derive(Default)]
struct FakeData {
    apartments: Vec<ApartmentListing>,
    votes: BTreeSet<(String, String)>,
    next_id: i64,
}

impl FakeData {
    fn sorted(&self) -> Vec<ApartmentListing> {
        let mut listings = self.apartments.clone();
        listings.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.id.cmp(&b.id)));
        listings
    }

    fn adjust_votes(&mut self, owner: &str, delta: i64) {
        if let Some(listing) = self.apartments.iter_mut().find(|l| l.email == owner) {
            listing.votes = listing.votes.saturating_add_signed(delta);
        }
    }
}

pub struct FakeGateway {
    data: Mutex<FakeData>,
    feed: ChangeFeed,
    pub fail_votes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub fail_upserts: AtomicBool,
    fail_owner: Mutex<Option<String>>,
    hold_votes: AtomicBool,
    release: Semaphore,
    vote_started: Notify,
    vote_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(FakeData::default()),
            feed: ChangeFeed::new(),
            fail_votes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_upserts: AtomicBool::new(false),
            fail_owner: Mutex::new(None),
            hold_votes: AtomicBool::new(false),
            release: Semaphore::new(0),
            vote_started: Notify::new(),
            vote_calls: AtomicUsize::new(0),
        }
    }

    /// Seed a listing with a fixed vote count and no backing vote rows.
    pub fn seed(&self, email: &str, votes: u64) {
        let mut data = self.data.lock().unwrap();
        data.next_id += 1;
        let now = Utc::now();
        let id = data.next_id;
        data.apartments.push(ApartmentListing {
            id,
            email: email.into(),
            left_wall_color: "#fbbf24".into(),
            right_wall_color: "#34d399".into(),
            sofa: "sofa-1.png".into(),
            mirror: "mirror-1.png".into(),
            votes,
            created_at: now,
            updated_at: now,
        });
    }

    pub fn seed_vote(&self, voter: &str, owner: &str) {
        let mut data = self.data.lock().unwrap();
        data.votes.insert((voter.into(), owner.into()));
    }

    pub fn votes_for(&self, owner: &str) -> Option<u64> {
        let data = self.data.lock().unwrap();
        data.apartments
            .iter()
            .find(|listing| listing.email == owner)
            .map(|listing| listing.votes)
    }

    pub fn snapshot(&self) -> Vec<ApartmentListing> {
        self.data.lock().unwrap().sorted()
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn set_fail_votes(&self, fail: bool) {
        self.fail_votes.store(fail, Ordering::SeqCst);
    }

    /// Fail vote calls that target `owner` only.
    pub fn fail_votes_for(&self, owner: &str) {
        *self.fail_owner.lock().unwrap() = Some(owner.to_string());
    }

    /// Park vote calls until [`FakeGateway::release_votes`] hands out permits.
    pub fn hold_votes(&self) {
        self.hold_votes.store(true, Ordering::SeqCst);
    }

    pub fn release_votes(&self, count: usize) {
        self.release.add_permits(count);
    }

    /// Resolves once a vote call has reached the gateway.
    pub async fn vote_started(&self) {
        self.vote_started.notified().await;
    }

    pub fn vote_calls(&self) -> usize {
        self.vote_calls.load(Ordering::SeqCst)
    }

    async fn enter_vote_call(&self, owner: &str) -> Result<()> {
        self.vote_calls.fetch_add(1, Ordering::SeqCst);
        self.vote_started.notify_one();
        if self.hold_votes.load(Ordering::SeqCst) {
            self.release
                .acquire()
                .await
                .map_err(|err| anyhow!("gate closed: {err}"))?
                .forget();
        }
        let owner_fails = self.fail_owner.lock().unwrap().as_deref() == Some(owner);
        if owner_fails || self.fail_votes.load(Ordering::SeqCst) {
            bail!("simulated transport failure");
        }
        Ok(())
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.feed.publish(&snapshot);
    }
}

impl ApartmentGateway for FakeGateway {
    async fn upsert_apartment(
        &self,
        email: &str,
        choice: &ApartmentChoice,
    ) -> Result<ApartmentListing> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            bail!("simulated transport failure");
        }
        let listing = {
            let mut data = self.data.lock().unwrap();
            let now = Utc::now();
            let position = data.apartments.iter().position(|l| l.email == email);
            if let Some(index) = position {
                let existing = &mut data.apartments[index];
                existing.left_wall_color = choice.left_wall_color.clone();
                existing.right_wall_color = choice.right_wall_color.clone();
                existing.sofa = choice.sofa.clone();
                existing.mirror = choice.mirror.clone();
                existing.updated_at = now;
                existing.clone()
            } else {
                data.next_id += 1;
                let listing = ApartmentListing {
                    id: data.next_id,
                    email: email.into(),
                    left_wall_color: choice.left_wall_color.clone(),
                    right_wall_color: choice.right_wall_color.clone(),
                    sofa: choice.sofa.clone(),
                    mirror: choice.mirror.clone(),
                    votes: 0,
                    created_at: now,
                    updated_at: now,
                };
                data.apartments.push(listing.clone());
                listing
            }
        };
        self.publish();
        Ok(listing)
    }

    async fn list_apartments(&self) -> Result<Vec<ApartmentListing>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("simulated transport failure");
        }
        Ok(self.snapshot())
    }

    async fn add_vote(&self, voter_email: &str, owner_email: &str) -> Result<VoteRecord> {
        self.enter_vote_call(owner_email).await?;
        {
            let mut data = self.data.lock().unwrap();
            if !data
                .votes
                .insert((voter_email.to_string(), owner_email.to_string()))
            {
                bail!("duplicate key value violates unique constraint");
            }
            data.adjust_votes(owner_email, 1);
        }
        self.publish();
        Ok(VoteRecord {
            id: self.vote_calls() as i64,
            voter_email: voter_email.into(),
            apartment_email: owner_email.into(),
            created_at: Utc::now(),
        })
    }

    async fn remove_vote(&self, voter_email: &str, owner_email: &str) -> Result<()> {
        self.enter_vote_call(owner_email).await?;
        let removed = {
            let mut data = self.data.lock().unwrap();
            let removed = data
                .votes
                .remove(&(voter_email.to_string(), owner_email.to_string()));
            if removed {
                data.adjust_votes(owner_email, -1);
            }
            removed
        };
        if removed {
            self.publish();
        }
        Ok(())
    }

    async fn list_votes_by_voter(&self, voter_email: &str) -> Result<Vec<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("simulated transport failure");
        }
        let data = self.data.lock().unwrap();
        Ok(data
            .votes
            .iter()
            .filter(|(voter, _)| voter == voter_email)
            .map(|(_, owner)| owner.clone())
            .collect())
    }

    fn subscribe(&self) -> Subscription {
        self.feed.subscribe()
    }
}
