// src/store.rs
//! SQLite-backed store for matches and notification receipts.
//!
//! One connection behind a mutex: every read and write is serialized, and every
//! multi-statement mutation runs inside a transaction, so readers never observe a
//! half-written match. Callers must not hold the store across network I/O; every
//! method takes the lock for the duration of the call only.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::model::{Match, NotificationReceipt};

const MATCH_COLUMNS: &str =
    "id, home_team, away_team, start_time_utc, source, created_at, url, description";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database file, creating its parent directory if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database dir {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("store connection mutex poisoned"))
    }

    /// Insert-or-replace a single match by id.
    pub fn upsert_match(&self, m: &Match) -> Result<()> {
        self.upsert_matches(std::slice::from_ref(m)).map(|_| ())
    }

    /// Insert-or-replace a batch of matches atomically. Returns the number written.
    pub fn upsert_matches(&self, matches: &[Match]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("begin upsert transaction")?;
        {
            let mut stmt = tx
                .prepare_cached(&format!(
                    "INSERT OR REPLACE INTO matches ({MATCH_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ))
                .context("prepare upsert")?;
            for m in matches {
                stmt.execute(params![
                    m.id,
                    m.home_team,
                    m.away_team,
                    m.start_time_utc.timestamp_millis(),
                    m.source,
                    m.created_at.timestamp_millis(),
                    m.url,
                    m.description,
                ])
                .with_context(|| format!("upsert match {}", m.id))?;
            }
        }
        tx.commit().context("commit upsert transaction")?;
        tracing::debug!(target: "store", count = matches.len(), "matches upserted");
        Ok(matches.len())
    }

    pub fn get_match(&self, id: &str) -> Result<Option<Match>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"),
            params![id],
            row_to_match,
        )
        .optional()
        .with_context(|| format!("get match {id}"))
    }

    /// Matches with `from <= start_time_utc <= until`, earliest first. Both ends inclusive.
    pub fn upcoming_matches(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<Match>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches
                 WHERE start_time_utc >= ?1 AND start_time_utc <= ?2
                 ORDER BY start_time_utc ASC"
            ))
            .context("prepare upcoming query")?;
        let rows = stmt
            .query_map(
                params![from.timestamp_millis(), until.timestamp_millis()],
                row_to_match,
            )
            .context("query upcoming matches")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("read upcoming matches")
    }

    /// Matches starting in `[from, to)`, earliest first.
    pub fn matches_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Match>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches
                 WHERE start_time_utc >= ?1 AND start_time_utc < ?2
                 ORDER BY start_time_utc ASC"
            ))
            .context("prepare range query")?;
        let rows = stmt
            .query_map(
                params![from.timestamp_millis(), to.timestamp_millis()],
                row_to_match,
            )
            .context("query match range")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("read match range")
    }

    pub fn match_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM matches", [], |r| r.get(0))
            .context("count matches")?;
        Ok(n.max(0) as usize)
    }

    pub fn is_notified(&self, match_id: &str, destination_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let hit = conn
            .query_row(
                "SELECT 1 FROM notification_receipts
                 WHERE match_id = ?1 AND destination_id = ?2",
                params![match_id, destination_id],
                |_| Ok(()),
            )
            .optional()
            .context("check receipt")?;
        Ok(hit.is_some())
    }

    /// Record a receipt. Returns `false` if one already existed; the first receipt wins.
    pub fn record_receipt(
        &self,
        match_id: &str,
        destination_id: &str,
        notified_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO notification_receipts (match_id, destination_id, notified_at)
                 VALUES (?1, ?2, ?3)",
                params![match_id, destination_id, notified_at.timestamp_millis()],
            )
            .with_context(|| format!("record receipt for {match_id}"))?;
        Ok(inserted == 1)
    }

    pub fn receipts_for(&self, match_id: &str) -> Result<Vec<NotificationReceipt>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT match_id, destination_id, notified_at FROM notification_receipts
                 WHERE match_id = ?1 ORDER BY destination_id",
            )
            .context("prepare receipt query")?;
        let rows = stmt
            .query_map(params![match_id], |row| {
                Ok(NotificationReceipt {
                    match_id: row.get(0)?,
                    destination_id: row.get(1)?,
                    notified_at: millis_to_utc(row.get(2)?, 2)?,
                })
            })
            .context("query receipts")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("read receipts")
    }

    pub fn receipt_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM notification_receipts", [], |r| {
                r.get(0)
            })
            .context("count receipts")?;
        Ok(n.max(0) as usize)
    }

    /// Delete matches starting before `cutoff`, then receipts whose match is gone.
    /// Both deletes commit together. Returns (matches, receipts) removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<(usize, usize)> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("begin prune transaction")?;
        let matches = tx
            .execute(
                "DELETE FROM matches WHERE start_time_utc < ?1",
                params![cutoff.timestamp_millis()],
            )
            .context("prune matches")?;
        let receipts = tx
            .execute(
                "DELETE FROM notification_receipts
                 WHERE match_id NOT IN (SELECT id FROM matches)",
                [],
            )
            .context("prune orphaned receipts")?;
        tx.commit().context("commit prune transaction")?;
        Ok((matches, receipts))
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS matches (
            id TEXT PRIMARY KEY,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            start_time_utc INTEGER NOT NULL,   -- unix millis, UTC
            source TEXT NOT NULL,
            created_at INTEGER NOT NULL,       -- unix millis, UTC
            url TEXT,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS notification_receipts (
            match_id TEXT NOT NULL,
            destination_id TEXT NOT NULL,
            notified_at INTEGER NOT NULL,      -- unix millis, UTC
            PRIMARY KEY (match_id, destination_id)
        );

        CREATE INDEX IF NOT EXISTS idx_matches_start_time ON matches(start_time_utc);
        ",
    )
    .context("migrating schema")
}

fn row_to_match(row: &Row<'_>) -> rusqlite::Result<Match> {
    Ok(Match {
        id: row.get(0)?,
        home_team: row.get(1)?,
        away_team: row.get(2)?,
        start_time_utc: millis_to_utc(row.get(3)?, 3)?,
        source: row.get(4)?,
        created_at: millis_to_utc(row.get(5)?, 5)?,
        url: row.get(6)?,
        description: row.get(7)?,
    })
}

fn millis_to_utc(ms: i64, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample(home: &str, away: &str, start: DateTime<Utc>) -> Match {
        Match::new(home, away, start, "ics", start - Duration::days(3))
    }

    #[test]
    fn upsert_replaces_by_id() {
        let store = Store::open_in_memory().unwrap();
        let t = Utc.with_ymd_and_hms(2025, 1, 10, 18, 0, 0).unwrap();
        let mut m = sample("Team A", "Team B", t);
        store.upsert_match(&m).unwrap();

        m.source = "schedule".into();
        m.url = Some("https://example.test/m".into());
        store.upsert_match(&m).unwrap();

        assert_eq!(store.match_count().unwrap(), 1);
        let got = store.get_match(&m.id).unwrap().unwrap();
        assert_eq!(got, m);
    }

    #[test]
    fn upcoming_is_inclusive_range_sorted_by_start() {
        let store = Store::open_in_memory().unwrap();
        let t = Utc.with_ymd_and_hms(2025, 1, 10, 18, 0, 0).unwrap();
        let past = sample("E", "F", t - Duration::days(3));
        let late = sample("C", "D", t + Duration::hours(2));
        let early = sample("A", "B", t);
        store
            .upsert_matches(&[late.clone(), past.clone(), early.clone()])
            .unwrap();

        let got = store.upcoming_matches(t, t + Duration::hours(1)).unwrap();
        assert_eq!(got, vec![early.clone()]);

        let all = store.upcoming_matches(t, t + Duration::hours(2)).unwrap();
        assert_eq!(all, vec![early.clone(), late.clone()]);

        // Past matches are outside the range unless asked for.
        let with_past = store
            .upcoming_matches(t - Duration::days(4), t + Duration::hours(2))
            .unwrap();
        assert_eq!(with_past, vec![past, early, late]);
    }

    #[test]
    fn receipt_is_recorded_once() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 17, 50, 0).unwrap();
        assert!(!store.is_notified("match_x", "123").unwrap());
        assert!(store.record_receipt("match_x", "123", now).unwrap());
        assert!(!store
            .record_receipt("match_x", "123", now + Duration::minutes(1))
            .unwrap());
        assert!(store.is_notified("match_x", "123").unwrap());
        assert!(!store.is_notified("match_x", "456").unwrap());

        let receipts = store.receipts_for("match_x").unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].notified_at, now);
    }

    #[test]
    fn prune_drops_old_matches_and_orphans() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let old = sample("A", "B", now - Duration::days(40));
        let fresh = sample("C", "D", now - Duration::days(2));
        store.upsert_matches(&[old.clone(), fresh.clone()]).unwrap();
        store.record_receipt(&old.id, "1", now).unwrap();
        store.record_receipt(&fresh.id, "1", now).unwrap();

        let (m, r) = store.prune_before(now - Duration::days(30)).unwrap();
        assert_eq!((m, r), (1, 1));
        assert!(store.get_match(&old.id).unwrap().is_none());
        assert!(store.is_notified(&fresh.id, "1").unwrap());
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bot.db");
        let t = Utc.with_ymd_and_hms(2025, 1, 10, 18, 0, 0).unwrap();
        let m = sample("A", "B", t);
        {
            let store = Store::open(&path).unwrap();
            store.upsert_match(&m).unwrap();
            store.record_receipt(&m.id, "42", t).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.get_match(&m.id).unwrap(), Some(m.clone()));
        assert!(store.is_notified(&m.id, "42").unwrap());
    }
}
