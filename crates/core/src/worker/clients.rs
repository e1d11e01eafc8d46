//! Pages attached to the worker and the messages posted to them.

use std::collections::BTreeSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Worker → page messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// One precache asset stored. `cached_count` counts every settled asset.
    #[serde(rename_all = "camelCase")]
    CacheProgress { progress: u8, cached_count: usize, total_assets: usize, url: String },
    /// A note sync pass finished.
    SyncCompleted { message: String },
}

impl WorkerMessage {
    pub fn cache_progress(cached_count: usize, total_assets: usize, url: impl Into<String>) -> Self {
        let progress = if total_assets == 0 {
            100
        } else {
            ((cached_count as f64 / total_assets as f64) * 100.0).round() as u8
        };
        Self::CacheProgress { progress, cached_count, total_assets, url: url.into() }
    }
}

const CHANNEL_CAPACITY: usize = 256;

/// Registry of page clients.
///
/// Messages go out on a broadcast channel; a client that is not subscribed
/// when a message is posted never sees it.
#[derive(Debug)]
pub struct ClientRegistry {
    tx: broadcast::Sender<WorkerMessage>,
    clients: Mutex<Clients>,
}

#[derive(Debug, Default)]
struct Clients {
    known: BTreeSet<String>,
    controlled: BTreeSet<String>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, clients: Mutex::new(Clients::default()) }
    }

    /// Attach a page and subscribe it to worker messages.
    pub fn register(&self, id: impl Into<String>) -> broadcast::Receiver<WorkerMessage> {
        let id = id.into();
        tracing::debug!(client = %id, "client registered");
        self.with_clients(|c| {
            c.known.insert(id);
        });
        self.tx.subscribe()
    }

    /// Subscribe without registering a page (observers, tests).
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
        self.tx.subscribe()
    }

    /// Take control of every registered page. Returns how many were claimed.
    pub fn claim(&self) -> usize {
        self.with_clients(|c| {
            c.controlled = c.known.clone();
            c.controlled.len()
        })
    }

    pub fn is_controlled(&self, id: &str) -> bool {
        self.with_clients(|c| c.controlled.contains(id))
    }

    #[cfg(test)]
    pub(crate) fn controlled_count(&self) -> usize {
        self.with_clients(|c| c.controlled.len())
    }

    /// Post to every subscriber. Returns the number of receivers reached.
    pub fn post_all(&self, message: WorkerMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    fn with_clients<T>(&self, f: impl FnOnce(&mut Clients) -> T) -> T {
        let mut guard = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
