use std::{collections::BTreeSet, sync::Arc};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    db::ApartmentListing,
    gateway::{ApartmentGateway, Subscription},
    ranking::{rank, RankedApartment},
};

use super::state::{ToggleRejection, VoteState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ToggleOutcome {
    /// Nothing changed, locally or remotely.
    Rejected { reason: ToggleRejection },
    Applied { voted: bool, votes: Option<u64> },
    /// The gateway call failed and the optimistic change was undone.
    RolledBack {
        voted: bool,
        votes: Option<u64>,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineEvent {
    Loaded { listings: usize },
    Pushed { listings: usize },
    VoteApplied { owner: String, voted: bool },
    VoteRolledBack { owner: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSnapshot {
    pub voter: Option<String>,
    pub listings: Vec<ApartmentListing>,
    pub voted_by_me: BTreeSet<String>,
    pub pending: BTreeSet<String>,
}

impl VoteSnapshot {
    pub fn votes_for(&self, owner: &str) -> Option<u64> {
        self.listings
            .iter()
            .find(|listing| listing.email == owner)
            .map(|listing| listing.votes)
    }
}

struct PushLoop {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl PushLoop {
    async fn shutdown(self) {
        self.cancel_token.cancel();
        if let Err(err) = self.handle.await {
            log_error!("Push loop task failed to join: {err}");
        }
    }
}

/// Keeps the local listing mirror and the voter's vote membership in step
/// with the gateway.
///
/// Clones share state. The state lock is never held across a gateway call,
/// so toggles on different owners can be in flight at the same time.
pub struct VoteEngine<G> {
    gateway: Arc<G>,
    state: Arc<Mutex<VoteState>>,
    events: broadcast::Sender<EngineEvent>,
    push: Arc<Mutex<Option<PushLoop>>>,
}

impl<G> Clone for VoteEngine<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            push: self.push.clone(),
        }
    }
}

impl<G: ApartmentGateway> VoteEngine<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            gateway,
            state: Arc::new(Mutex::new(VoteState::new())),
            events,
            push: Arc::new(Mutex::new(None)),
        }
    }

    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Fetch all listings and the voter's own votes, then replace local state.
    /// On failure the previous state is kept.
    ///
    /// A snapshot pushed while the fetch was running is newer than the
    /// fetched listings, so in that case only membership is taken.
    pub async fn load(&self, voter_email: &str) -> Result<()> {
        let generation = self.state.lock().await.generation();
        let (listings, voted_owners) = tokio::try_join!(
            self.gateway.list_apartments(),
            self.gateway.list_votes_by_voter(voter_email),
        )
        .inspect_err(|err| log_error!("Error loading data for {voter_email}: {err:#}"))
        .context("failed to load listings and votes")?;

        let count = listings.len();
        {
            let mut state = self.state.lock().await;
            if state.generation() == generation {
                state.replace_all(voter_email.to_string(), listings, voted_owners);
            } else {
                log_debug!("Listings pushed during load for {voter_email}; keeping pushed set");
                state.replace_membership(voter_email.to_string(), voted_owners);
            }
        }

        log_info!("Loaded {count} listings for {voter_email}");
        let _ = self.events.send(EngineEvent::Loaded { listings: count });
        Ok(())
    }

    /// Re-read listings only. Membership is untouched.
    pub async fn refresh(&self) -> Result<()> {
        let listings = self
            .gateway
            .list_apartments()
            .await
            .context("failed to refresh listings")?;
        self.on_push(listings).await;
        Ok(())
    }

    pub async fn on_push(&self, listings: Vec<ApartmentListing>) {
        apply_snapshot(&self.state, &self.events, listings).await;
    }

    pub async fn toggle_vote(&self, owner: &str) -> ToggleOutcome {
        let (voter, pending) = {
            let mut state = self.state.lock().await;
            let Some(voter) = state.voter().map(str::to_owned) else {
                return ToggleOutcome::Rejected {
                    reason: ToggleRejection::NotLoaded,
                };
            };
            match state.begin_toggle(owner) {
                Ok(pending) => (voter, pending),
                Err(reason) => {
                    log_debug!("Vote toggle for {owner} ignored: {reason:?}");
                    return ToggleOutcome::Rejected { reason };
                }
            }
        };

        let result = if pending.adds_vote() {
            self.gateway.add_vote(&voter, owner).await.map(|_| ())
        } else {
            self.gateway.remove_vote(&voter, owner).await
        };

        let mut state = self.state.lock().await;
        match result {
            Ok(()) => {
                state.confirm_toggle(owner);
                let voted = state.has_voted(owner);
                let votes = state.vote_count(owner);
                drop(state);

                let _ = self.events.send(EngineEvent::VoteApplied {
                    owner: owner.to_string(),
                    voted,
                });
                ToggleOutcome::Applied { voted, votes }
            }
            Err(err) => {
                state.roll_back_toggle(owner);
                let voted = state.has_voted(owner);
                let votes = state.vote_count(owner);
                drop(state);

                let error = format!("{err:#}");
                log_warn!("Vote toggle for {owner} rolled back: {error}");
                let _ = self.events.send(EngineEvent::VoteRolledBack {
                    owner: owner.to_string(),
                    error: error.clone(),
                });
                ToggleOutcome::RolledBack {
                    voted,
                    votes,
                    error,
                }
            }
        }
    }

    pub async fn snapshot(&self) -> VoteSnapshot {
        let state = self.state.lock().await;
        VoteSnapshot {
            voter: state.voter().map(str::to_owned),
            listings: state.listings().cloned().collect(),
            voted_by_me: state.voted_by_me().iter().cloned().collect(),
            pending: state.pending_targets(),
        }
    }

    pub async fn ranking(&self) -> Vec<RankedApartment> {
        let state = self.state.lock().await;
        rank(state.listings(), state.voted_by_me(), state.voter())
    }

    /// Subscribe to listing changes and apply them as they arrive. Replaces a
    /// loop that is already running.
    pub async fn start_push(&self) {
        let subscription = self.gateway.subscribe();
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(push_loop(
            subscription,
            self.state.clone(),
            self.events.clone(),
            cancel_token.clone(),
        ));

        let previous = self.push.lock().await.replace(PushLoop {
            handle,
            cancel_token,
        });
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
    }

    /// Cancel the receive loop and release its subscription.
    pub async fn stop_push(&self) {
        let running = self.push.lock().await.take();
        if let Some(running) = running {
            running.shutdown().await;
        }
    }

    pub async fn is_pushing(&self) -> bool {
        self.push.lock().await.is_some()
    }

    pub async fn shutdown(&self) {
        self.stop_push().await;
        self.state.lock().await.clear();
    }
}

async fn apply_snapshot(
    state: &Mutex<VoteState>,
    events: &broadcast::Sender<EngineEvent>,
    listings: Vec<ApartmentListing>,
) {
    let count = listings.len();
    state.lock().await.apply_push(listings);
    log_debug!("Applied listing snapshot with {count} entries");
    let _ = events.send(EngineEvent::Pushed { listings: count });
}

async fn push_loop(
    mut subscription: Subscription,
    state: Arc<Mutex<VoteState>>,
    events: broadcast::Sender<EngineEvent>,
    cancel_token: CancellationToken,
) {
    log_info!("Push loop started on subscription {}", subscription.id());
    loop {
        tokio::select! {
            snapshot = subscription.recv() => match snapshot {
                Some(listings) => apply_snapshot(&state, &events, listings).await,
                None => {
                    log_info!("Listing feed closed; push loop exiting");
                    break;
                }
            },
            _ = cancel_token.cancelled() => {
                log_info!("Push loop shutting down");
                break;
            }
        }
    }
    subscription.unsubscribe();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fake::FakeGateway;
    use std::time::Duration;
    use tokio::time::timeout;

    fn scenario() -> Arc<FakeGateway> {
        let gateway = Arc::new(FakeGateway::new());
        gateway.seed("b@x.com", 3);
        gateway.seed("c@x.com", 5);
        gateway.seed_vote("a@x.com", "c@x.com");
        gateway
    }

    async fn loaded_engine() -> (Arc<FakeGateway>, VoteEngine<FakeGateway>) {
        let gateway = scenario();
        let engine = VoteEngine::new(gateway.clone());
        engine.load("a@x.com").await.unwrap();
        (gateway, engine)
    }

    async fn next_push(events: &mut broadcast::Receiver<EngineEvent>) -> usize {
        loop {
            let event = timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("timed out waiting for push")
                .unwrap();
            if let EngineEvent::Pushed { listings } = event {
                return listings;
            }
        }
    }

    #[tokio::test]
    async fn load_renders_ranking_with_membership() {
        let (_gateway, engine) = loaded_engine().await;
        let rows = engine.ranking().await;

        let order: Vec<_> = rows.iter().map(|r| (r.email.as_str(), r.votes)).collect();
        assert_eq!(order, vec![("c@x.com", 5), ("b@x.com", 3)]);
        assert!(rows[0].voted_by_me);
        assert!(!rows[1].voted_by_me);
        assert!(rows.iter().all(|row| row.email != "a@x.com"));
        assert!(rows.iter().all(|row| row.can_vote));
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let (_gateway, engine) = loaded_engine().await;
        let first = engine.snapshot().await;
        engine.load("a@x.com").await.unwrap();
        let second = engine.snapshot().await;

        assert_eq!(first.listings, second.listings);
        assert_eq!(first.voted_by_me, second.voted_by_me);
    }

    #[tokio::test]
    async fn failed_load_keeps_last_known_state() {
        let (gateway, engine) = loaded_engine().await;
        let before = engine.snapshot().await;

        gateway.fail_reads.store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(engine.load("a@x.com").await.is_err());
        assert!(engine.refresh().await.is_err());

        let after = engine.snapshot().await;
        assert_eq!(before.listings, after.listings);
        assert_eq!(before.voted_by_me, after.voted_by_me);
    }

    #[tokio::test]
    async fn optimistic_toggle_shows_before_gateway_and_rolls_back_on_failure() {
        let (gateway, engine) = loaded_engine().await;
        gateway.hold_votes();

        let task = tokio::spawn({
            let engine = engine.clone();
            async move { engine.toggle_vote("b@x.com").await }
        });

        gateway.vote_started().await;
        let during = engine.snapshot().await;
        assert_eq!(during.votes_for("b@x.com"), Some(4));
        assert!(during.voted_by_me.contains("b@x.com"));
        assert!(during.pending.contains("b@x.com"));

        gateway.set_fail_votes(true);
        gateway.release_votes(1);
        let outcome = task.await.unwrap();
        assert!(matches!(
            outcome,
            ToggleOutcome::RolledBack { voted: false, votes: Some(3), .. }
        ));

        let after = engine.snapshot().await;
        assert_eq!(after.votes_for("b@x.com"), Some(3));
        assert!(!after.voted_by_me.contains("b@x.com"));
        assert!(after.pending.is_empty());
    }

    #[tokio::test]
    async fn failed_add_leaves_state_identical() {
        let (gateway, engine) = loaded_engine().await;
        let mut events = engine.events();
        let before = engine.snapshot().await;

        gateway.set_fail_votes(true);
        let outcome = engine.toggle_vote("b@x.com").await;
        assert!(matches!(outcome, ToggleOutcome::RolledBack { .. }));

        let after = engine.snapshot().await;
        assert_eq!(before.listings, after.listings);
        assert_eq!(before.voted_by_me, after.voted_by_me);
        assert_eq!(gateway.votes_for("b@x.com"), Some(3));
        assert!(matches!(
            events.recv().await.unwrap(),
            EngineEvent::VoteRolledBack { .. }
        ));
    }

    #[tokio::test]
    async fn self_vote_is_a_no_op() {
        let gateway = scenario();
        gateway.seed("a@x.com", 2);
        let engine = VoteEngine::new(gateway.clone());
        engine.load("a@x.com").await.unwrap();
        let before = engine.snapshot().await;

        let outcome = engine.toggle_vote("a@x.com").await;
        assert_eq!(
            outcome,
            ToggleOutcome::Rejected {
                reason: ToggleRejection::SelfVote
            }
        );
        assert_eq!(gateway.vote_calls(), 0);
        assert_eq!(engine.snapshot().await.listings, before.listings);

        let rows = engine.ranking().await;
        let own = rows.iter().find(|row| row.email == "a@x.com").unwrap();
        assert!(!own.can_vote);
    }

    #[tokio::test]
    async fn toggle_before_load_is_rejected() {
        let engine = VoteEngine::new(scenario());
        assert_eq!(
            engine.toggle_vote("b@x.com").await,
            ToggleOutcome::Rejected {
                reason: ToggleRejection::NotLoaded
            }
        );
    }

    #[tokio::test]
    async fn successful_toggles_alternate() {
        let (gateway, engine) = loaded_engine().await;

        for round in 1..=4 {
            let outcome = engine.toggle_vote("b@x.com").await;
            let voted = round % 2 == 1;
            let votes = if voted { 4 } else { 3 };
            assert_eq!(
                outcome,
                ToggleOutcome::Applied {
                    voted,
                    votes: Some(votes)
                }
            );
            assert_eq!(gateway.votes_for("b@x.com"), Some(votes));
        }

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.votes_for("b@x.com"), Some(3));
        assert!(!snapshot.voted_by_me.contains("b@x.com"));
        assert_eq!(gateway.vote_calls(), 4);
    }

    #[tokio::test]
    async fn concurrent_toggles_roll_back_independently() {
        let (gateway, engine) = loaded_engine().await;
        gateway.hold_votes();
        gateway.fail_votes_for("b@x.com");

        let vote_b = tokio::spawn({
            let engine = engine.clone();
            async move { engine.toggle_vote("b@x.com").await }
        });
        gateway.vote_started().await;
        let vote_c = tokio::spawn({
            let engine = engine.clone();
            async move { engine.toggle_vote("c@x.com").await }
        });
        gateway.vote_started().await;

        let during = engine.snapshot().await;
        assert_eq!(during.pending.len(), 2);
        assert_eq!(during.votes_for("b@x.com"), Some(4));
        assert_eq!(during.votes_for("c@x.com"), Some(4));

        gateway.release_votes(2);
        assert!(matches!(
            vote_b.await.unwrap(),
            ToggleOutcome::RolledBack { .. }
        ));
        assert_eq!(
            vote_c.await.unwrap(),
            ToggleOutcome::Applied {
                voted: false,
                votes: Some(4)
            }
        );

        let after = engine.snapshot().await;
        assert_eq!(after.votes_for("b@x.com"), Some(3));
        assert_eq!(after.votes_for("c@x.com"), Some(4));
        assert!(after.voted_by_me.is_empty());
    }

    #[tokio::test]
    async fn repeated_toggle_while_in_flight_is_ignored() {
        let (gateway, engine) = loaded_engine().await;
        gateway.hold_votes();

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.toggle_vote("b@x.com").await }
        });
        gateway.vote_started().await;

        assert_eq!(
            engine.toggle_vote("b@x.com").await,
            ToggleOutcome::Rejected {
                reason: ToggleRejection::InFlight
            }
        );
        gateway.release_votes(1);
        assert!(matches!(
            first.await.unwrap(),
            ToggleOutcome::Applied { voted: true, .. }
        ));
        assert_eq!(engine.snapshot().await.votes_for("b@x.com"), Some(4));
        assert_eq!(gateway.vote_calls(), 1);
    }

    #[tokio::test]
    async fn push_during_toggle_is_not_double_counted() {
        let (gateway, engine) = loaded_engine().await;
        gateway.hold_votes();

        let task = tokio::spawn({
            let engine = engine.clone();
            async move { engine.toggle_vote("b@x.com").await }
        });
        gateway.vote_started().await;

        let mut pushed = engine.snapshot().await.listings;
        for listing in pushed.iter_mut() {
            if listing.email == "b@x.com" {
                listing.votes = 4;
            }
        }
        engine.on_push(pushed).await;

        gateway.release_votes(1);
        assert!(matches!(
            task.await.unwrap(),
            ToggleOutcome::Applied {
                voted: true,
                votes: Some(4)
            }
        ));
    }

    #[tokio::test]
    async fn push_replaces_listings_but_not_membership() {
        let (_gateway, engine) = loaded_engine().await;
        let mut pushed = engine.snapshot().await.listings;
        pushed.retain(|listing| listing.email == "b@x.com");
        pushed[0].votes = 10;

        engine.on_push(pushed).await;
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.listings.len(), 1);
        assert_eq!(snapshot.votes_for("b@x.com"), Some(10));
        assert!(snapshot.voted_by_me.contains("c@x.com"));
    }

    #[tokio::test]
    async fn push_loop_applies_gateway_changes_until_stopped() {
        let (gateway, engine) = loaded_engine().await;
        let mut events = engine.events();
        engine.start_push().await;
        assert!(engine.is_pushing().await);
        assert_eq!(gateway.feed().subscriber_count(), 1);

        gateway.seed("d@x.com", 0);
        gateway.feed().publish(&gateway.snapshot());
        assert_eq!(next_push(&mut events).await, 3);
        assert_eq!(engine.snapshot().await.listings.len(), 3);

        engine.stop_push().await;
        assert!(!engine.is_pushing().await);
        assert_eq!(gateway.feed().subscriber_count(), 0);

        gateway.seed("e@x.com", 0);
        gateway.feed().publish(&gateway.snapshot());
        assert_eq!(engine.snapshot().await.listings.len(), 3);
    }

    #[tokio::test]
    async fn restarting_push_keeps_a_single_subscription() {
        let (gateway, engine) = loaded_engine().await;
        engine.start_push().await;
        engine.start_push().await;
        assert_eq!(gateway.feed().subscriber_count(), 1);

        engine.shutdown().await;
        assert_eq!(gateway.feed().subscriber_count(), 0);
        assert!(engine.snapshot().await.voter.is_none());
    }

    #[tokio::test]
    async fn refresh_applies_listings_without_touching_votes() {
        let (gateway, engine) = loaded_engine().await;
        gateway.seed("d@x.com", 8);

        engine.refresh().await.unwrap();
        let rows = engine.ranking().await;
        assert_eq!(rows[0].email, "d@x.com");
        assert!(engine.snapshot().await.voted_by_me.contains("c@x.com"));
    }
}
