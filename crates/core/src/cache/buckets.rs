//! Versioned response buckets.
//!
//! A bucket is the atomic unit of invalidation: entries are never expired
//! individually, the whole bucket is dropped when its version is retired.

use super::{ResourceCache, decode_headers, encode_headers};
use crate::Error;
use crate::http::{Response, ResponseKind};
use crate::store::{LocalDb, hash};
use tokio_rusqlite::{params, rusqlite};

/// Prefix shared by every bucket name.
pub const BUCKET_PREFIX: &str = "offline-h5-v";

/// Bucket name for a cache version, e.g. `offline-h5-v3.5.1`.
pub fn bucket_name(version: &str) -> String {
    format!("{BUCKET_PREFIX}{version}")
}

/// Handle to one named bucket.
#[derive(Clone, Debug)]
pub struct Bucket {
    db: LocalDb,
    name: String,
}

impl LocalDb {
    /// Open a bucket, creating it if absent.
    pub async fn open_bucket(&self, name: &str) -> Result<Bucket, Error> {
        let bucket = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO cache_buckets (name, created_at) VALUES (?1, ?2)",
                    params![bucket, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(Bucket { db: self.clone(), name: name.to_string() })
    }

    /// Names of every existing bucket, oldest first.
    pub async fn bucket_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_buckets ORDER BY created_at, name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Whether a bucket exists.
    #[cfg(test)]
    pub(crate) async fn has_bucket(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM cache_buckets WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a bucket and all its entries. Returns whether it existed.
    pub async fn delete_bucket(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM cache_buckets WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

impl Bucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entries in the bucket.
    pub async fn len(&self) -> Result<u64, Error> {
        let bucket = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries WHERE bucket = ?1", params![bucket], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait::async_trait]
impl ResourceCache for Bucket {
    async fn put(&self, url: &str, response: &Response) -> Result<(), Error> {
        let bucket = self.name.clone();
        let url = url.to_string();
        let headers_json = encode_headers(&response.headers)?;
        let digest = hash::body_digest(&response.body);
        let response = response.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let result = conn.execute(
                    "INSERT INTO cache_entries (
                        bucket, url, status, status_text, headers_json, body, body_digest, kind, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(bucket, url) DO UPDATE SET
                        status = excluded.status,
                        status_text = excluded.status_text,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        body_digest = excluded.body_digest,
                        kind = excluded.kind,
                        stored_at = excluded.stored_at",
                    params![
                        &bucket,
                        &url,
                        response.status,
                        &response.status_text,
                        &headers_json,
                        &response.body,
                        &digest,
                        response.kind.as_str(),
                        chrono::Utc::now().to_rfc3339(),
                    ],
                );
                match result {
                    Ok(_) => Ok(()),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Err(Error::BucketNotFound(bucket))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, url: &str) -> Result<Option<Response>, Error> {
        let bucket = self.name.clone();
        let key = url.to_string();
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<(u16, String, String, Vec<u8>, String, String)>, Error> {
                let result = conn.query_row(
                    "SELECT status, status_text, headers_json, body, body_digest, kind
                     FROM cache_entries WHERE bucket = ?1 AND url = ?2",
                    params![bucket, key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)),
                );
                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((status, status_text, headers_json, body, digest, kind)) = row else {
            return Ok(None);
        };

        if !hash::verify(&body, &digest) {
            tracing::warn!(bucket = %self.name, url, "cached body does not match its digest, ignoring entry");
            return Ok(None);
        }

        Ok(Some(Response {
            url: url.to_string(),
            status,
            status_text,
            headers: decode_headers(&headers_json)?,
            body,
            kind: ResponseKind::parse(&kind),
        }))
    }

    async fn delete(&self, url: &str) -> Result<bool, Error> {
        let bucket = self.name.clone();
        let url = url.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted =
                    conn.execute("DELETE FROM cache_entries WHERE bucket = ?1 AND url = ?2", params![bucket, url])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn list_all(&self) -> Result<Vec<String>, Error> {
        let bucket = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM cache_entries WHERE bucket = ?1 ORDER BY url")?;
                let urls = stmt
                    .query_map(params![bucket], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }
}
