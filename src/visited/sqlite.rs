//! SQLite visited set
//!
//! Every consumer process pointed at the same database file shares one
//! claim table. `try_claim` is a single upsert statement, so SQLite's write
//! lock is what serializes racing workers.

use crate::state::{VisitState, VisitedRecord};
use crate::visited::schema::initialize_schema;
use crate::visited::{VisitedError, VisitedResult, VisitedSet};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

/// How long a writer waits on another process's lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CLAIM_SQL: &str = "
    INSERT INTO visited (url, state, claimed_at_ms, attempts)
    VALUES (?1, ?2, ?3, 0)
    ON CONFLICT(url) DO UPDATE
        SET state = excluded.state, claimed_at_ms = excluded.claimed_at_ms
        WHERE visited.state = ?4
           OR (visited.state = ?2 AND visited.claimed_at_ms <= ?5)
";

const FINISH_SQL: &str = "
    UPDATE visited SET state = ?1, attempts = attempts + ?2
    WHERE url = ?3 AND state = ?4
    RETURNING attempts
";

/// SQLite visited-set backend
pub struct SqliteVisitedSet {
    conn: Mutex<Connection>,
    claim_ttl: Option<Duration>,
}

impl SqliteVisitedSet {
    /// Opens (or creates) the visited database at `path`
    ///
    /// Pending claims older than `claim_ttl` may be taken over by another
    /// worker; with `None` they are held until explicitly finished.
    pub fn open(path: &Path, claim_ttl: Option<Duration>) -> VisitedResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            claim_ttl,
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory(claim_ttl: Option<Duration>) -> VisitedResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            claim_ttl,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims older than this timestamp (ms since epoch) have expired
    fn expiry_cutoff_ms(&self) -> i64 {
        match self.claim_ttl {
            Some(ttl) => {
                let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
                Utc::now().timestamp_millis().saturating_sub(ttl_ms)
            }
            None => i64::MIN,
        }
    }

    fn read_record(conn: &Connection, url: &Url) -> VisitedResult<Option<VisitedRecord>> {
        let row: Option<(String, i64, u32)> = conn
            .query_row(
                "SELECT state, claimed_at_ms, attempts FROM visited WHERE url = ?1",
                params![url.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((state, claimed_at_ms, attempts)) = row else {
            return Ok(None);
        };

        let state = VisitState::from_db_string(&state).ok_or_else(|| VisitedError::Corrupt {
            url: url.to_string(),
            message: format!("unknown state '{}'", state),
        })?;
        let claimed_at = Utc
            .timestamp_millis_opt(claimed_at_ms)
            .single()
            .ok_or_else(|| VisitedError::Corrupt {
                url: url.to_string(),
                message: format!("invalid claim timestamp {}", claimed_at_ms),
            })?;

        Ok(Some(VisitedRecord {
            url: url.clone(),
            claimed_at,
            state,
            attempts,
        }))
    }

    /// Moves a pending record to `to`, optionally charging an attempt
    fn finish_claim(&self, url: &Url, to: VisitState, charge: bool) -> VisitedResult<u32> {
        let conn = self.lock();
        let attempts: Option<u32> = conn
            .query_row(
                FINISH_SQL,
                params![
                    to.to_db_string(),
                    u32::from(charge),
                    url.as_str(),
                    VisitState::Pending.to_db_string()
                ],
                |row| row.get(0),
            )
            .optional()?;

        match attempts {
            Some(attempts) => Ok(attempts),
            None => Err(VisitedError::InvalidTransition {
                url: url.to_string(),
                from: Self::read_record(&conn, url)?.map(|r| r.state),
                to,
            }),
        }
    }
}

#[async_trait]
impl VisitedSet for SqliteVisitedSet {
    async fn try_claim(&self, url: &Url) -> VisitedResult<bool> {
        let cutoff = self.expiry_cutoff_ms();
        let changed = self.lock().execute(
            CLAIM_SQL,
            params![
                url.as_str(),
                VisitState::Pending.to_db_string(),
                Utc::now().timestamp_millis(),
                VisitState::Released.to_db_string(),
                cutoff
            ],
        )?;
        Ok(changed == 1)
    }

    async fn mark_done(&self, url: &Url) -> VisitedResult<()> {
        self.finish_claim(url, VisitState::Done, false).map(|_| ())
    }

    async fn mark_failed(&self, url: &Url) -> VisitedResult<()> {
        self.finish_claim(url, VisitState::Failed, false).map(|_| ())
    }

    async fn release(&self, url: &Url) -> VisitedResult<u32> {
        self.finish_claim(url, VisitState::Released, true)
    }

    async fn unclaim(&self, url: &Url) -> VisitedResult<()> {
        self.finish_claim(url, VisitState::Released, false).map(|_| ())
    }

    async fn reset(&self, url: &Url) -> VisitedResult<bool> {
        let removed = self
            .lock()
            .execute("DELETE FROM visited WHERE url = ?1", params![url.as_str()])?;
        Ok(removed > 0)
    }

    async fn get(&self, url: &Url) -> VisitedResult<Option<VisitedRecord>> {
        Self::read_record(&self.lock(), url)
    }

    async fn count_by_state(&self, state: VisitState) -> VisitedResult<u64> {
        let count: i64 = self.lock().query_row(
            "SELECT COUNT(*) FROM visited WHERE state = ?1",
            params![state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}
