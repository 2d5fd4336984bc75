use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;

use crate::db::ApartmentListing;

/// What the engine must undo if the gateway rejects a toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToggle {
    pub was_voted: bool,
    pub prior_votes: u64,
    /// A push replaced this listing while the toggle was in flight, so its
    /// count is authoritative and must not be rewound.
    pub superseded: bool,
}

impl PendingToggle {
    /// True when this toggle adds a vote, false when it removes one.
    pub fn adds_vote(&self) -> bool {
        !self.was_voted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ToggleRejection {
    NotLoaded,
    SelfVote,
    UnknownListing,
    InFlight,
}

/// Local mirror of the listings plus the loaded voter's own vote membership.
///
/// Listings keep the order they arrived in; the ranking view relies on that
/// for stable tie order.
#[derive(Debug, Clone, Default)]
pub struct VoteState {
    voter: Option<String>,
    listings: IndexMap<String, ApartmentListing>,
    voted_by_me: HashSet<String>,
    pending: HashMap<String, PendingToggle>,
    /// Bumped on every applied listing snapshot.
    generation: u64,
}

impl VoteState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn voter(&self) -> Option<&str> {
        self.voter.as_deref()
    }

    pub fn listings(&self) -> impl Iterator<Item = &ApartmentListing> {
        self.listings.values()
    }

    pub fn vote_count(&self, owner: &str) -> Option<u64> {
        self.listings.get(owner).map(|listing| listing.votes)
    }

    pub fn has_voted(&self, owner: &str) -> bool {
        self.voted_by_me.contains(owner)
    }

    pub fn voted_by_me(&self) -> &HashSet<String> {
        &self.voted_by_me
    }

    pub fn pending_targets(&self) -> BTreeSet<String> {
        self.pending.keys().cloned().collect()
    }

    pub fn is_pending(&self, owner: &str) -> bool {
        self.pending.contains_key(owner)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace everything with a freshly fetched view for `voter`.
    pub fn replace_all(
        &mut self,
        voter: String,
        listings: Vec<ApartmentListing>,
        voted_owners: Vec<String>,
    ) {
        self.replace_membership(voter, voted_owners);
        self.apply_push(listings);
    }

    /// Take `voter` and their vote list from the store. Toggles still in
    /// flight keep their optimistic membership until they resolve.
    pub fn replace_membership(&mut self, voter: String, voted_owners: Vec<String>) {
        if self.voter.as_deref() != Some(voter.as_str()) {
            self.pending.clear();
        }
        self.voter = Some(voter);
        self.voted_by_me = voted_owners.into_iter().collect();

        for (owner, pending) in &self.pending {
            if pending.was_voted {
                self.voted_by_me.remove(owner);
            } else {
                self.voted_by_me.insert(owner.clone());
            }
        }
    }

    /// Take a pushed snapshot as the authoritative listing set. Membership is
    /// left alone: it only ever comes from the voter's own vote list.
    pub fn apply_push(&mut self, listings: Vec<ApartmentListing>) {
        self.listings = listings
            .into_iter()
            .map(|listing| (listing.email.clone(), listing))
            .collect();
        self.generation += 1;

        for (owner, pending) in self.pending.iter_mut() {
            if self.listings.contains_key(owner) {
                pending.superseded = true;
            }
        }
    }

    /// Flip membership for `owner` and move its count by one, recording what
    /// is needed to undo it.
    pub fn begin_toggle(&mut self, owner: &str) -> Result<PendingToggle, ToggleRejection> {
        let voter = self.voter.as_deref().ok_or(ToggleRejection::NotLoaded)?;
        if voter == owner {
            return Err(ToggleRejection::SelfVote);
        }
        if self.pending.contains_key(owner) {
            return Err(ToggleRejection::InFlight);
        }
        let listing = self
            .listings
            .get_mut(owner)
            .ok_or(ToggleRejection::UnknownListing)?;

        let was_voted = self.voted_by_me.contains(owner);
        let pending = PendingToggle {
            was_voted,
            prior_votes: listing.votes,
            superseded: false,
        };

        if was_voted {
            listing.votes = listing.votes.saturating_sub(1);
            self.voted_by_me.remove(owner);
        } else {
            listing.votes = listing.votes.saturating_add(1);
            self.voted_by_me.insert(owner.to_string());
        }

        self.pending.insert(owner.to_string(), pending.clone());
        Ok(pending)
    }

    /// The gateway accepted the toggle; the optimistic state stands.
    pub fn confirm_toggle(&mut self, owner: &str) -> Option<PendingToggle> {
        self.pending.remove(owner)
    }

    /// The gateway rejected the toggle; undo exactly what `begin_toggle` did.
    pub fn roll_back_toggle(&mut self, owner: &str) -> Option<PendingToggle> {
        let pending = self.pending.remove(owner)?;

        if pending.was_voted {
            self.voted_by_me.insert(owner.to_string());
        } else {
            self.voted_by_me.remove(owner);
        }

        if !pending.superseded {
            if let Some(listing) = self.listings.get_mut(owner) {
                listing.votes = pending.prior_votes;
            }
        }

        Some(pending)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
