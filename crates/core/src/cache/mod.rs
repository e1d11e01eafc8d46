//! URL-keyed response caches.
//!
//! Two backings share one contract:
//!
//! - [`Bucket`]: a named, versioned set of response snapshots owned by the
//!   worker. Deleting the bucket is the only way to invalidate it.
//! - [`RecordStore`]: a namespace of resource records with write timestamps
//!   and byte sizes, used by the fallback controller and the media cache.
//!   Bounded by size-based eviction.
//!
//! Strategies are written against [`ResourceCache`] so the same algorithm
//! runs over either backing.

pub mod buckets;
pub mod records;

pub use buckets::{Bucket, bucket_name};
pub use records::{EvictionPolicy, EvictionReport, RecordMeta, RecordStore, ResourceRecord};

use crate::Error;
use crate::http::Response;

/// Single-record, last-write-wins response cache keyed by absolute URL.
#[async_trait::async_trait]
pub trait ResourceCache: Send + Sync {
    /// Store a snapshot, replacing any entry for the same URL.
    async fn put(&self, url: &str, response: &Response) -> Result<(), Error>;

    /// The stored snapshot, or `None` on a miss.
    async fn get(&self, url: &str) -> Result<Option<Response>, Error>;

    /// Remove an entry. Returns whether one existed.
    async fn delete(&self, url: &str) -> Result<bool, Error>;

    /// Every cached URL.
    async fn list_all(&self) -> Result<Vec<String>, Error>;
}

pub(crate) fn encode_headers(headers: &crate::http::Headers) -> Result<String, Error> {
    Ok(serde_json::to_string(headers)?)
}

pub(crate) fn decode_headers(json: &str) -> Result<crate::http::Headers, Error> {
    Ok(serde_json::from_str(json)?)
}
