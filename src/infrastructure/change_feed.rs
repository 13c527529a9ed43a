use crate::domain::models::BlockInstance;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// One mutation observed on the user's block data.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// Insert (`old = None`), update, or delete (`new = None`) of a block
    /// instance row.
    BlockInstance {
        old: Option<BlockInstance>,
        new: Option<BlockInstance>,
    },
    /// Any mutation of a block type row.
    BlockType { block_type_id: String },
}

#[derive(Debug, Clone)]
pub struct BlockChange {
    pub user_id: String,
    pub event: ChangeEvent,
}

pub type ChangeCallback = Box<dyn Fn(&BlockChange) + Send + Sync>;

/// Realtime change feed over block data. Implementations invoke the callback
/// for every insert/update/delete scoped to the subscribed user.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, user_id: &str, callback: ChangeCallback) -> ChangeSubscription;
}

/// Unsubscribes on `unsubscribe()` or on drop.
pub struct ChangeSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ChangeSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

type SubscriberMap = HashMap<u64, (String, ChangeCallback)>;

/// In-process feed for tests and single-process wiring. Callbacks run
/// synchronously on the publishing thread.
#[derive(Default)]
pub struct InMemoryChangeFeed {
    subscribers: Arc<Mutex<SubscriberMap>>,
    next_key: AtomicU64,
}

impl InMemoryChangeFeed {
    pub fn publish(&self, change: &BlockChange) {
        let Ok(subscribers) = self.subscribers.lock() else {
            return;
        };
        for (user_id, callback) in subscribers.values() {
            if user_id == &change.user_id {
                callback(change);
            }
        }
    }
}

impl ChangeFeed for InMemoryChangeFeed {
    fn subscribe(&self, user_id: &str, callback: ChangeCallback) -> ChangeSubscription {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        {
            let Ok(mut subscribers) = self.subscribers.lock() else {
                return ChangeSubscription::new(|| {});
            };
            subscribers.insert(key, (user_id.to_string(), callback));
        }

        let subscribers = Arc::clone(&self.subscribers);
        ChangeSubscription::new(move || {
            if let Ok(mut subscribers) = subscribers.lock() {
                subscribers.remove(&key);
            }
        })
    }
}
