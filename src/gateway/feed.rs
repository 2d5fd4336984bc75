use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::ApartmentListing;

/// Full listing set as delivered by a change notification.
pub type ListingSnapshot = Vec<ApartmentListing>;

type Subscribers = HashMap<Uuid, mpsc::UnboundedSender<ListingSnapshot>>;

/// Registry of listing-change subscribers.
///
/// Every publish delivers the complete refreshed listing set, never a delta.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.lock().insert(id, sender);

        Subscription {
            id,
            receiver,
            feed: self.clone(),
        }
    }

    /// Send `snapshot` to every live subscriber. Returns how many received it.
    pub fn publish(&self, snapshot: &[ApartmentListing]) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|_, sender| sender.send(snapshot.to_vec()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every subscriber; their receivers observe end-of-stream.
    pub fn close(&self) {
        self.lock().clear();
    }

    fn remove(&self, id: &Uuid) {
        self.lock().remove(id);
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Receiving end of a [`ChangeFeed`]. Unsubscribes when dropped.
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::UnboundedReceiver<ListingSnapshot>,
    feed: ChangeFeed,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next snapshot, or `None` once the feed has been closed.
    pub async fn recv(&mut self) -> Option<ListingSnapshot> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ListingSnapshot> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.feed.remove(&self.id);
    }
}
