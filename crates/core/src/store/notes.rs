//! Note CRUD operations.
//!
//! Notes are append-only. The only mutation is the 0→1 flip of `synced`.

use super::connection::LocalDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

/// A locally stored note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Note {
    pub id: i64,
    pub text: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub synced: bool,
}

impl Note {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Note {
            id: row.get(0)?,
            text: row.get(1)?,
            timestamp: row.get(2)?,
            synced: row.get::<_, i64>(3)? == 1,
        })
    }
}

impl LocalDb {
    /// Append a note. `online` decides the initial `synced` flag.
    ///
    /// Returns the assigned id.
    pub async fn add_note(&self, text: &str, online: bool) -> Result<i64, Error> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(Error::InvalidInput("note text must not be empty".into()));
        }
        let timestamp = chrono::Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO notes (text, timestamp, synced) VALUES (?1, ?2, ?3)",
                    params![text, timestamp, online as i64],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)
    }

    /// All notes, newest first.
    pub async fn get_all_notes(&self) -> Result<Vec<Note>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<Note>, Error> {
                let mut stmt = conn
                    .prepare("SELECT id, text, timestamp, synced FROM notes ORDER BY timestamp DESC, id DESC")?;
                let notes = stmt
                    .query_map([], Note::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(notes)
            })
            .await
            .map_err(Error::from)
    }

    /// Notes whose `synced` flag equals `synced`, served by the synced index.
    pub async fn get_notes_by_synced(&self, synced: bool) -> Result<Vec<Note>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<Note>, Error> {
                let mut stmt =
                    conn.prepare("SELECT id, text, timestamp, synced FROM notes WHERE synced = ?1 ORDER BY id")?;
                let notes = stmt
                    .query_map(params![synced as i64], Note::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(notes)
            })
            .await
            .map_err(Error::from)
    }

    /// Flip the given notes to synced in one transaction.
    ///
    /// Rows already synced are left alone. Returns the number flipped.
    pub async fn mark_notes_synced(&self, ids: &[i64]) -> Result<u64, Error> {
        let ids = ids.to_vec();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.unchecked_transaction()?;
                let mut flipped = 0;
                {
                    let mut stmt = tx.prepare("UPDATE notes SET synced = 1 WHERE id = ?1 AND synced = 0")?;
                    for id in &ids {
                        flipped += stmt.execute(params![id])? as u64;
                    }
                }
                tx.commit()?;
                Ok(flipped)
            })
            .await
            .map_err(Error::from)
    }
}
