//! Resource records: URL-keyed payloads with timestamps and sizes.
//!
//! Each [`RecordStore`] is a namespace inside the `resource_records` table.
//! Namespaces never see each other's records, and eviction is computed per
//! namespace.

use super::{ResourceCache, decode_headers, encode_headers};
use crate::Error;
use crate::http::{Headers, Response, ResponseKind};
use crate::store::{LocalDb, hash};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

/// A stored resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub url: String,
    pub body: Vec<u8>,
    pub headers: Headers,
    /// Write (or last access) time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ResourceRecord {
    /// A record stamped with the current time.
    pub fn new(url: impl Into<String>, body: Vec<u8>, headers: Headers) -> Self {
        Self { url: url.into(), body, headers, timestamp: chrono::Utc::now().timestamp_millis() }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }

    /// Rebuild a response the way the fallback serves stored payloads:
    /// always a same-origin 200 with the captured headers.
    pub fn into_response(self) -> Response {
        Response {
            url: self.url,
            status: 200,
            status_text: "OK".to_string(),
            headers: self.headers,
            body: self.body,
            kind: ResponseKind::Basic,
        }
    }
}

/// Record metadata without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub url: String,
    pub timestamp: i64,
    pub size: u64,
}

/// Size ceiling and the fraction of it to shrink to once exceeded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionPolicy {
    pub max_bytes: u64,
    pub target_ratio: f64,
}

impl EvictionPolicy {
    pub const DEFAULT_MAX_BYTES: u64 = 500 * 1024 * 1024;
    pub const DEFAULT_TARGET_RATIO: f64 = 0.7;

    pub fn new(max_bytes: u64, target_ratio: f64) -> Self {
        Self { max_bytes, target_ratio }
    }

    /// Usage the store is shrunk to once over the ceiling.
    pub fn target_bytes(&self) -> u64 {
        (self.max_bytes as f64 * self.target_ratio) as u64
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_BYTES, Self::DEFAULT_TARGET_RATIO)
    }
}

/// Outcome of an eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionReport {
    pub usage_before: u64,
    pub usage_after: u64,
    pub evicted: Vec<String>,
}

/// Handle to one record namespace.
#[derive(Clone, Debug)]
pub struct RecordStore {
    db: LocalDb,
    name: String,
}

impl LocalDb {
    /// Handle to the named record namespace. Namespaces need no creation step.
    pub fn record_store(&self, name: &str) -> RecordStore {
        RecordStore { db: self.clone(), name: name.to_string() }
    }
}

type RecordRow = (Vec<u8>, String, i64, String);

impl RecordStore {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or replace a record (last write wins).
    pub async fn put_record(&self, record: &ResourceRecord) -> Result<(), Error> {
        let store = self.name.clone();
        let headers_json = encode_headers(&record.headers)?;
        let digest = hash::body_digest(&record.body);
        let record = record.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO resource_records (store, url, body, headers_json, timestamp, size, body_digest)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(store, url) DO UPDATE SET
                        body = excluded.body,
                        headers_json = excluded.headers_json,
                        timestamp = excluded.timestamp,
                        size = excluded.size,
                        body_digest = excluded.body_digest",
                    params![
                        &store,
                        &record.url,
                        &record.body,
                        &headers_json,
                        record.timestamp,
                        record.size() as i64,
                        &digest,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Fetch a record by URL.
    pub async fn get_record(&self, url: &str) -> Result<Option<ResourceRecord>, Error> {
        let store = self.name.clone();
        let key = url.to_string();
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<RecordRow>, Error> {
                let result = conn.query_row(
                    "SELECT body, headers_json, timestamp, body_digest
                     FROM resource_records WHERE store = ?1 AND url = ?2",
                    params![store, key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                );
                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((body, headers_json, timestamp, digest)) = row else {
            return Ok(None);
        };

        if !hash::verify(&body, &digest) {
            tracing::warn!(store = %self.name, url, "record body does not match its digest, ignoring record");
            return Ok(None);
        }

        Ok(Some(ResourceRecord { url: url.to_string(), body, headers: decode_headers(&headers_json)?, timestamp }))
    }

    /// Whether a record exists for the URL.
    pub async fn contains(&self, url: &str) -> Result<bool, Error> {
        let store = self.name.clone();
        let url = url.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM resource_records WHERE store = ?1 AND url = ?2)",
                    params![store, url],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Refresh a record's timestamp so it is evicted last.
    pub async fn touch(&self, url: &str) -> Result<bool, Error> {
        let store = self.name.clone();
        let url = url.to_string();
        let now = chrono::Utc::now().timestamp_millis();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let updated = conn.execute(
                    "UPDATE resource_records SET timestamp = ?3 WHERE store = ?1 AND url = ?2",
                    params![store, url, now],
                )?;
                Ok(updated > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Metadata of every record, oldest first.
    pub async fn records(&self) -> Result<Vec<RecordMeta>, Error> {
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<RecordMeta>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, timestamp, size FROM resource_records
                     WHERE store = ?1 ORDER BY timestamp ASC, rowid ASC",
                )?;
                let records = stmt
                    .query_map(params![store], |row| {
                        Ok(RecordMeta { url: row.get(0)?, timestamp: row.get(1)?, size: row.get::<_, i64>(2)? as u64 })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of records in the namespace.
    pub async fn count(&self) -> Result<u64, Error> {
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM resource_records WHERE store = ?1", params![store], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Sum of record sizes in bytes.
    pub async fn total_size(&self) -> Result<u64, Error> {
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let total: i64 = conn.query_row(
                    "SELECT COALESCE(SUM(size), 0) FROM resource_records WHERE store = ?1",
                    params![store],
                    |row| row.get(0),
                )?;
                Ok(total as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete oldest records until usage is at most the policy's target.
    ///
    /// Does nothing while usage is at or below the ceiling.
    pub async fn evict(&self, policy: EvictionPolicy) -> Result<EvictionReport, Error> {
        let store = self.name.clone();
        let report = self
            .db
            .conn
            .call(move |conn| -> Result<EvictionReport, Error> {
                let tx = conn.unchecked_transaction()?;
                let usage: i64 = tx.query_row(
                    "SELECT COALESCE(SUM(size), 0) FROM resource_records WHERE store = ?1",
                    params![store],
                    |row| row.get(0),
                )?;
                let usage = usage as u64;
                let mut report = EvictionReport { usage_before: usage, usage_after: usage, evicted: Vec::new() };
                if usage <= policy.max_bytes {
                    return Ok(report);
                }

                let to_free = usage - policy.target_bytes().min(usage);
                let mut freed = 0u64;
                {
                    let mut oldest = tx.prepare(
                        "SELECT url, size FROM resource_records WHERE store = ?1 ORDER BY timestamp ASC, rowid ASC",
                    )?;
                    let candidates = oldest
                        .query_map(params![store], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                        .collect::<Result<Vec<_>, _>>()?;
                    let mut delete = tx.prepare("DELETE FROM resource_records WHERE store = ?1 AND url = ?2")?;
                    for (url, size) in candidates {
                        if freed >= to_free {
                            break;
                        }
                        delete.execute(params![store, url])?;
                        freed += size as u64;
                        report.evicted.push(url);
                    }
                }
                tx.commit()?;
                report.usage_after = usage - freed;
                Ok(report)
            })
            .await
            .map_err(Error::from)?;

        if !report.evicted.is_empty() {
            tracing::info!(
                store = %self.name,
                evicted = report.evicted.len(),
                usage_before = report.usage_before,
                usage_after = report.usage_after,
                "evicted oldest records"
            );
        }
        Ok(report)
    }
}

#[async_trait::async_trait]
impl ResourceCache for RecordStore {
    async fn put(&self, url: &str, response: &Response) -> Result<(), Error> {
        self.put_record(&ResourceRecord::new(url, response.body.clone(), response.headers.clone()))
            .await
    }

    async fn get(&self, url: &str) -> Result<Option<Response>, Error> {
        Ok(self.get_record(url).await?.map(ResourceRecord::into_response))
    }

    async fn delete(&self, url: &str) -> Result<bool, Error> {
        let store = self.name.clone();
        let url = url.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted =
                    conn.execute("DELETE FROM resource_records WHERE store = ?1 AND url = ?2", params![store, url])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn list_all(&self) -> Result<Vec<String>, Error> {
        Ok(self.records().await?.into_iter().map(|r| r.url).collect())
    }
}
