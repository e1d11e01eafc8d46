//! Media cache with a prioritised preload queue.
//!
//! Media live in their own record namespace. Reads refresh a record's
//! timestamp so eviction drops the least recently used first. The queue
//! drains one URL at a time; a second drain request while one is running is
//! a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::connectivity::Connectivity;
use super::probe::{NetworkQuality, QualityProbe};
use crate::Error;
use crate::cache::{EvictionPolicy, EvictionReport, RecordStore, ResourceRecord};
use crate::http::{Network, Request};
use crate::store::{RetryPolicy, retry};

/// Record namespace of the media cache.
pub const MEDIA_STORE: &str = "video-cache-store";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct QueuedMedia {
    pub url: String,
    pub priority: u32,
}

/// What a drain step did with one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadOutcome {
    AlreadyCached(String),
    SkippedPoorNetwork(String),
    Cached(String),
    Failed(String, String),
}

/// Map a media URL to the variant suited to the network quality.
///
/// Offline or poor picks `-low`, medium picks `-medium`; anything else keeps
/// the original. Only `.mp4` URLs have variants.
pub fn quality_variant(url: &str, quality: NetworkQuality, online: bool) -> String {
    let Some(stem) = url.strip_suffix(".mp4") else {
        return url.to_string();
    };
    match quality {
        _ if !online => format!("{stem}-low.mp4"),
        NetworkQuality::Poor => format!("{stem}-low.mp4"),
        NetworkQuality::Medium => format!("{stem}-medium.mp4"),
        NetworkQuality::Good | NetworkQuality::Unknown => url.to_string(),
    }
}

pub struct MediaCache {
    store: RecordStore,
    network: Arc<dyn Network>,
    probe: Arc<QualityProbe>,
    connectivity: Connectivity,
    eviction: EvictionPolicy,
    queue: Mutex<Vec<QueuedMedia>>,
    draining: AtomicBool,
}

impl MediaCache {
    pub fn new(
        store: RecordStore, network: Arc<dyn Network>, probe: Arc<QualityProbe>, connectivity: Connectivity,
        eviction: EvictionPolicy,
    ) -> Self {
        Self {
            store,
            network,
            probe,
            connectivity,
            eviction,
            queue: Mutex::new(Vec::new()),
            draining: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Shrink the namespace if it is over its ceiling.
    pub async fn clean(&self) -> Result<EvictionReport, Error> {
        self.store.evict(self.eviction).await
    }

    /// Queue a URL. A URL already queued keeps the higher of its priorities.
    pub fn enqueue(&self, url: &str, priority: u32) {
        let mut queue = self.lock_queue();
        match queue.iter_mut().find(|item| item.url == url) {
            Some(existing) => existing.priority = existing.priority.max(priority),
            None => queue.push(QueuedMedia { url: url.to_string(), priority }),
        }
        queue.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Snapshot of the queue, highest priority first.
    pub fn queued(&self) -> Vec<QueuedMedia> {
        self.lock_queue().clone()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Queue a URL and drain in the background.
    pub fn preload(self: &Arc<Self>, url: &str, priority: u32) {
        self.enqueue(url, priority);
        if !self.is_draining() {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.drain().await;
            });
        }
    }

    /// Process the queue until it is empty. Returns nothing if another drain
    /// is already running.
    pub async fn drain(&self) -> Vec<PreloadOutcome> {
        if self.draining.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }
        let mut outcomes = Vec::new();
        while let Some(next) = self.next_or_release() {
            outcomes.push(self.preload_one(next.url).await);
        }
        outcomes
    }

    /// Take the head of the queue. On an empty queue the drain flag is
    /// cleared under the queue lock, so a concurrent `preload` either lands
    /// before the check or sees the flag down and spawns its own drain.
    fn next_or_release(&self) -> Option<QueuedMedia> {
        let mut queue = self.lock_queue();
        if queue.is_empty() {
            self.draining.store(false, Ordering::SeqCst);
            None
        } else {
            Some(queue.remove(0))
        }
    }

    async fn preload_one(&self, url: String) -> PreloadOutcome {
        match self.store.contains(&url).await {
            Ok(true) => {
                tracing::debug!(url, "media already cached");
                return PreloadOutcome::AlreadyCached(url);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(url, error = %e, "media lookup failed");
                return PreloadOutcome::Failed(url, e.to_string());
            }
        }
        if self.probe.quality() == NetworkQuality::Poor {
            tracing::info!(url, "poor network, skipping preload");
            return PreloadOutcome::SkippedPoorNetwork(url);
        }
        match self.fetch_and_store(&url).await {
            Ok(_) => PreloadOutcome::Cached(url),
            Err(e) => {
                tracing::warn!(url, error = %e, "media preload failed");
                PreloadOutcome::Failed(url, e.to_string())
            }
        }
    }

    /// Cached media (its timestamp refreshed), or fetch and cache it when
    /// online.
    pub async fn fetch_media(&self, url: &str) -> Result<ResourceRecord, Error> {
        if let Some(record) = self.store.get_record(url).await? {
            self.store.touch(url).await?;
            return Ok(record);
        }
        if !self.connectivity.is_online() {
            return Err(Error::Offline(format!("{url} is not cached")));
        }
        self.fetch_and_store(url).await
    }

    async fn fetch_and_store(&self, url: &str) -> Result<ResourceRecord, Error> {
        let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        let response = self.network.fetch(&Request::get(parsed)).await?;
        if !response.is_success() {
            return Err(Error::HttpError(format!("{url}: status {}", response.status)));
        }

        let record = ResourceRecord::new(url, response.body, response.headers);
        retry(RetryPolicy::write(), "media cache write", || self.store.put_record(&record)).await?;
        tracing::info!(url, size = record.size(), "media cached");

        if let Err(e) = self.clean().await {
            tracing::warn!(error = %e, "media eviction failed");
        }
        Ok(record)
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, Vec<QueuedMedia>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
