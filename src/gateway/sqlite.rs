use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use tokio::{
    runtime::Handle,
    sync::oneshot,
    time::{Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::db::{read_data_version, ApartmentChoice, ApartmentListing, Database, VoteRecord};

use super::{ApartmentGateway, ChangeFeed, Subscription};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const WATCH_INTERVAL_MS: u64 = 250;

/// Stops the commit watcher once the last gateway clone is gone.
struct Watcher {
    cancel_token: CancellationToken,
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Gateway backed by the embedded SQLite store.
///
/// Writes that change a row are followed by a full re-read of the listing
/// set, which is published to subscribers. Once someone subscribes, a
/// watcher also polls `PRAGMA data_version` and publishes after commits made
/// through other connections, such as another process on the same file.
#[derive(Clone)]
pub struct SqliteGateway {
    db: Database,
    feed: ChangeFeed,
    watcher: Arc<Mutex<Option<Watcher>>>,
}

impl SqliteGateway {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            feed: ChangeFeed::new(),
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn is_watching(&self) -> bool {
        self.watcher_slot().is_some()
    }

    async fn publish_change(&self) {
        publish_snapshot(&self.db, &self.feed).await;
    }

    fn ensure_watching(&self) {
        let mut slot = self.watcher_slot();
        if slot.is_some() {
            return;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log_warn!("No async runtime; commits from other connections will not be pushed");
                return;
            }
        };

        // Queued now, so it runs before any read a subscriber issues next.
        let baseline = match self.db.submit(read_data_version) {
            Ok(baseline) => baseline,
            Err(err) => {
                log_error!("Failed to start commit watcher: {err:#}");
                return;
            }
        };

        let cancel_token = CancellationToken::new();
        handle.spawn(watch_commits(
            self.db.clone(),
            self.feed.clone(),
            baseline,
            cancel_token.clone(),
        ));
        *slot = Some(Watcher { cancel_token });
    }

    fn watcher_slot(&self) -> MutexGuard<'_, Option<Watcher>> {
        match self.watcher.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

async fn publish_snapshot(db: &Database, feed: &ChangeFeed) {
    match db.list_apartments().await {
        Ok(listings) => {
            let delivered = feed.publish(&listings);
            log_debug!(
                "Published {} listings to {} subscriber(s)",
                listings.len(),
                delivered
            );
        }
        Err(err) => {
            log_error!("Failed to refresh listings after change: {err:#}");
        }
    }
}

async fn watch_commits(
    db: Database,
    feed: ChangeFeed,
    baseline: oneshot::Receiver<Result<i64>>,
    cancel_token: CancellationToken,
) {
    let baseline = baseline
        .await
        .map_err(|_| anyhow!("database thread terminated unexpectedly"))
        .and_then(|version| version);
    let mut last_version = match baseline {
        Ok(version) => version,
        Err(err) => {
            log_error!("Commit watcher could not read data_version: {err:#}");
            return;
        }
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(WATCH_INTERVAL_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log_info!("Commit watcher started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let version = match db.data_version().await {
                    Ok(version) => version,
                    Err(err) => {
                        log_warn!("Commit watcher poll failed: {err:#}");
                        continue;
                    }
                };
                if version != last_version {
                    last_version = version;
                    log_debug!("External commit detected (data_version {version})");
                    if feed.subscriber_count() > 0 {
                        publish_snapshot(&db, &feed).await;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("Commit watcher shutting down");
                break;
            }
        }
    }
}

impl ApartmentGateway for SqliteGateway {
    async fn upsert_apartment(
        &self,
        email: &str,
        choice: &ApartmentChoice,
    ) -> Result<ApartmentListing> {
        let listing = self.db.upsert_apartment(email, choice).await.inspect_err(|err| {
            log_error!("Error upserting apartment for {email}: {err:#}");
        })?;
        self.publish_change().await;
        Ok(listing)
    }

    async fn list_apartments(&self) -> Result<Vec<ApartmentListing>> {
        self.db.list_apartments().await.inspect_err(|err| {
            log_error!("Error fetching apartments: {err:#}");
        })
    }

    async fn add_vote(&self, voter_email: &str, owner_email: &str) -> Result<VoteRecord> {
        log_info!("Recording vote from {voter_email} for {owner_email}");
        let record = self
            .db
            .insert_vote(voter_email, owner_email)
            .await
            .inspect_err(|err| {
                log_error!("Error voting: {err:#}");
            })?;
        self.publish_change().await;
        Ok(record)
    }

    async fn remove_vote(&self, voter_email: &str, owner_email: &str) -> Result<()> {
        log_info!("Removing vote from {voter_email} for {owner_email}");
        let removed = self
            .db
            .delete_vote(voter_email, owner_email)
            .await
            .inspect_err(|err| {
                log_error!("Error removing vote: {err:#}");
            })?;
        if removed {
            self.publish_change().await;
        }
        Ok(())
    }

    async fn list_votes_by_voter(&self, voter_email: &str) -> Result<Vec<String>> {
        self.db
            .list_votes_by_voter(voter_email)
            .await
            .inspect_err(|err| {
                log_error!("Error fetching votes for {voter_email}: {err:#}");
            })
    }

    fn subscribe(&self) -> Subscription {
        let subscription = self.feed.subscribe();
        self.ensure_watching();
        log_info!("Listing subscription {} opened", subscription.id());
        subscription
    }
}
