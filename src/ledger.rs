//! Ledger adapter: the single source of truth for commitment status.
//!
//! The trait mirrors a spreadsheet-like store — append a row, find a row,
//! conditionally flip its status — and is treated as eventually
//! consistent: callers re-read before conditional writes, and the only
//! terminal-write path is the compare-and-set `transition_if_pending`.
//!
//! `SqliteLedger` is the bundled implementation. The database defaults to
//! `~/.keeper/keeper.db`; rows are disposable state, not user documents.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use thiserror::Error;

use crate::types::{Commitment, CommitmentKind, CommitmentStatus};

/// Errors specific to ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("home directory not found")]
    HomeDirNotFound,

    #[error("failed to create ledger directory: {0}")]
    CreateDir(std::io::Error),

    #[error("malformed ledger row {id}: bad {field}")]
    MalformedRow { id: String, field: &'static str },
}

/// Result of the conditional status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWrite {
    Updated,
    NotFound,
    /// The row exists but already left `Pending` — the caller lost the
    /// race and must discard its transition.
    NotPending,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Persist a new commitment row. Returns the record id (the ledger
    /// may assign its own; `SqliteLedger` keeps the caller's).
    async fn append(&self, commitment: &Commitment) -> Result<String, LedgerError>;

    /// Fetch one row by id.
    async fn find(&self, id: &str) -> Result<Option<Commitment>, LedgerError>;

    /// Compare-and-set terminal write: flip the status only if the row is
    /// still `Pending`.
    async fn transition_if_pending(
        &self,
        id: &str,
        to: CommitmentStatus,
    ) -> Result<StatusWrite, LedgerError>;

    /// All rows of a kind scheduled within the given local calendar day,
    /// ordered by scheduled time.
    async fn due_on_day(
        &self,
        kind: CommitmentKind,
        day: NaiveDate,
        tz: Tz,
    ) -> Result<Vec<Commitment>, LedgerError>;
}

/// SQLite-backed ledger. The connection is not `Sync`, so it lives behind
/// a Mutex; every call does a short synchronous transaction.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the database at `~/.keeper/keeper.db`.
    pub fn open() -> Result<Self, LedgerError> {
        Self::open_at(Self::default_path()?)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(LedgerError::CreateDir)?;
            }
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// In-memory database for tests and ephemeral hosts.
    pub fn in_memory() -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn default_path() -> Result<PathBuf, LedgerError> {
        let home = dirs::home_dir().ok_or(LedgerError::HomeDirNotFound)?;
        Ok(home.join(".keeper").join("keeper.db"))
    }

    fn row_to_commitment(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok(RawRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            description: row.get(3)?,
            scheduled_at: row.get(4)?,
            duration_minutes: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

/// Raw text columns before field-level parsing.
struct RawRow {
    id: String,
    user_id: String,
    kind: String,
    description: String,
    scheduled_at: String,
    duration_minutes: u32,
    status: String,
    created_at: String,
}

impl RawRow {
    fn parse(self) -> Result<Commitment, LedgerError> {
        let kind = CommitmentKind::parse(&self.kind).ok_or(LedgerError::MalformedRow {
            id: self.id.clone(),
            field: "kind",
        })?;
        let status = CommitmentStatus::parse(&self.status).ok_or(LedgerError::MalformedRow {
            id: self.id.clone(),
            field: "status",
        })?;
        let scheduled_at = DateTime::parse_from_rfc3339(&self.scheduled_at)
            .map_err(|_| LedgerError::MalformedRow {
                id: self.id.clone(),
                field: "scheduled_at",
            })?
            .with_timezone(&Utc);
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|_| LedgerError::MalformedRow {
                id: self.id.clone(),
                field: "created_at",
            })?
            .with_timezone(&Utc);

        Ok(Commitment {
            id: self.id,
            user_id: self.user_id,
            kind,
            description: self.description,
            scheduled_at,
            duration_minutes: self.duration_minutes,
            status,
            created_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, user_id, kind, description, scheduled_at, duration_minutes, status, created_at";

#[async_trait]
impl Ledger for SqliteLedger {
    async fn append(&self, commitment: &Commitment) -> Result<String, LedgerError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO commitments
                (id, user_id, kind, description, scheduled_at, duration_minutes, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                commitment.id,
                commitment.user_id,
                commitment.kind.as_str(),
                commitment.description,
                commitment.scheduled_at.to_rfc3339(),
                commitment.duration_minutes,
                commitment.status.as_str(),
                commitment.created_at.to_rfc3339(),
            ],
        )?;
        Ok(commitment.id.clone())
    }

    async fn find(&self, id: &str) -> Result<Option<Commitment>, LedgerError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM commitments WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], Self::row_to_commitment)?;
        match rows.next() {
            Some(raw) => Ok(Some(raw?.parse()?)),
            None => Ok(None),
        }
    }

    async fn transition_if_pending(
        &self,
        id: &str,
        to: CommitmentStatus,
    ) -> Result<StatusWrite, LedgerError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE commitments SET status = ?2 WHERE id = ?1 AND status = 'pending'",
            params![id, to.as_str()],
        )?;
        if changed == 1 {
            return Ok(StatusWrite::Updated);
        }
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM commitments WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if exists {
            Ok(StatusWrite::NotPending)
        } else {
            Ok(StatusWrite::NotFound)
        }
    }

    async fn due_on_day(
        &self,
        kind: CommitmentKind,
        day: NaiveDate,
        tz: Tz,
    ) -> Result<Vec<Commitment>, LedgerError> {
        // Resolve the local calendar day to a UTC window.
        let start = tz
            .from_local_datetime(&day.and_time(NaiveTime::MIN))
            .single()
            .or_else(|| tz.from_local_datetime(&day.and_time(NaiveTime::MIN)).earliest())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN)));
        let end = start + chrono::Duration::days(1);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM commitments
             WHERE kind = ?1 AND scheduled_at >= ?2 AND scheduled_at < ?3
             ORDER BY scheduled_at"
        ))?;
        let raw_rows = stmt
            .query_map(
                params![kind.as_str(), start.to_rfc3339(), end.to_rfc3339()],
                Self::row_to_commitment,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        raw_rows.into_iter().map(RawRow::parse).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(id: &str, at: DateTime<Utc>) -> Commitment {
        Commitment {
            id: id.to_string(),
            user_id: "alice".to_string(),
            kind: CommitmentKind::Event,
            description: "Dinner with family".to_string(),
            scheduled_at: at,
            duration_minutes: 120,
            status: CommitmentStatus::Pending,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_append_and_find_round_trip() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 19, 0, 0).unwrap();
        let commitment = sample("c1", at);

        let id = ledger.append(&commitment).await.unwrap();
        assert_eq!(id, "c1");

        let found = ledger.find("c1").await.unwrap().unwrap();
        assert_eq!(found, commitment);
        assert!(ledger.find("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_if_pending_is_compare_and_set() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 19, 0, 0).unwrap();
        ledger.append(&sample("c1", at)).await.unwrap();

        let first = ledger
            .transition_if_pending("c1", CommitmentStatus::Done)
            .await
            .unwrap();
        assert_eq!(first, StatusWrite::Updated);

        // The losing side of the race sees NotPending, and the status
        // keeps the first write.
        let second = ledger
            .transition_if_pending("c1", CommitmentStatus::Missed)
            .await
            .unwrap();
        assert_eq!(second, StatusWrite::NotPending);
        let row = ledger.find("c1").await.unwrap().unwrap();
        assert_eq!(row.status, CommitmentStatus::Done);

        let missing = ledger
            .transition_if_pending("ghost", CommitmentStatus::Done)
            .await
            .unwrap();
        assert_eq!(missing, StatusWrite::NotFound);
    }

    #[tokio::test]
    async fn test_due_on_day_filters_by_local_day_and_kind() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let tz = chrono_tz::UTC;
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        ledger
            .append(&sample(
                "today-1",
                Utc.with_ymd_and_hms(2024, 1, 2, 19, 0, 0).unwrap(),
            ))
            .await
            .unwrap();
        ledger
            .append(&sample(
                "today-0",
                Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap(),
            ))
            .await
            .unwrap();
        ledger
            .append(&sample(
                "other-day",
                Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap(),
            ))
            .await
            .unwrap();
        let mut task = sample("task-1", Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap());
        task.kind = CommitmentKind::Task;
        ledger.append(&task).await.unwrap();

        let events = ledger
            .due_on_day(CommitmentKind::Event, day, tz)
            .await
            .unwrap();
        let ids: Vec<&str> = events.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["today-0", "today-1"]);
    }

    #[tokio::test]
    async fn test_open_at_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keeper.db");
        let ledger = SqliteLedger::open_at(path.clone()).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 19, 0, 0).unwrap();
        ledger.append(&sample("c1", at)).await.unwrap();
        assert!(path.exists());
    }
}
