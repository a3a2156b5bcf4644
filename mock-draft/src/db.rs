// SQLite persistence layer for events, picks, and submissions.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::draft::event::DraftEvent;
use crate::draft::pick::DraftPick;
use crate::prediction::submission::Submission;
use crate::store::EventStore;

/// SQLite-backed [`EventStore`].
///
/// The event row holds the event snapshot as JSON (teams, pool, order,
/// status); picks live in their own table so the log can be queried and is
/// protected by uniqueness constraints.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS events (
                id         TEXT PRIMARY KEY,
                name       TEXT NOT NULL,
                status     TEXT NOT NULL,
                snapshot   TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS draft_picks (
                event_id    TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                pick_number INTEGER NOT NULL,
                round       INTEGER NOT NULL,
                team_id     INTEGER NOT NULL,
                player_id   INTEGER NOT NULL,
                made_at     TEXT NOT NULL,
                PRIMARY KEY (event_id, pick_number),
                UNIQUE (event_id, player_id)
            );

            CREATE TABLE IF NOT EXISTS submissions (
                event_id    TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                participant TEXT NOT NULL,
                body        TEXT NOT NULL,
                locked      INTEGER NOT NULL DEFAULT 0,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (event_id, participant)
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Load the pick log for an event, ordered by pick number.
    pub fn load_picks(&self, event_id: &str) -> Result<Vec<DraftPick>> {
        let conn = self.conn();
        Self::query_picks(&conn, event_id)
    }

    fn query_picks(conn: &Connection, event_id: &str) -> Result<Vec<DraftPick>> {
        let mut stmt = conn
            .prepare(
                "SELECT pick_number, round, team_id, player_id, made_at
                 FROM draft_picks WHERE event_id = ?1 ORDER BY pick_number",
            )
            .context("failed to prepare load_picks query")?;

        let rows = stmt
            .query_map(params![event_id], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .context("failed to query draft picks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draft pick rows")?;

        rows.into_iter()
            .map(|(pick_number, round, team_id, player_id, made_at)| {
                Ok(DraftPick {
                    pick_number,
                    round,
                    team_id,
                    player_id,
                    made_at: parse_timestamp(&made_at)?,
                })
            })
            .collect()
    }

    /// Upsert the event row (snapshot without picks) and its pick log.
    fn write_event(tx: &Transaction<'_>, event: &DraftEvent) -> Result<()> {
        let mut snapshot = serde_json::to_value(event).context("failed to serialize event")?;
        snapshot["picks"] = serde_json::Value::Array(Vec::new());
        let snapshot =
            serde_json::to_string(&snapshot).context("failed to serialize event snapshot")?;

        tx.execute(
            "INSERT INTO events (id, name, status, snapshot, updated_at)
             VALUES (?1, ?2, ?3, ?4, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
             ON CONFLICT(id) DO UPDATE SET
                name       = excluded.name,
                status     = excluded.status,
                snapshot   = excluded.snapshot,
                updated_at = excluded.updated_at",
            params![event.id, event.name, event.status.as_str(), snapshot],
        )
        .context("failed to save event")?;
        Self::write_picks(tx, event)
    }

    fn write_picks(tx: &Transaction<'_>, event: &DraftEvent) -> Result<()> {
        tx.execute(
            "DELETE FROM draft_picks WHERE event_id = ?1",
            params![event.id],
        )
        .context("failed to clear draft picks")?;

        let mut stmt = tx
            .prepare(
                "INSERT INTO draft_picks (event_id, pick_number, round, team_id, player_id, made_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .context("failed to prepare pick insert")?;
        for pick in &event.picks {
            stmt.execute(params![
                event.id,
                pick.pick_number,
                pick.round,
                pick.team_id,
                pick.player_id,
                pick.made_at.to_rfc3339(),
            ])
            .with_context(|| format!("failed to record pick {}", pick.pick_number))?;
        }
        Ok(())
    }

    fn write_submission(conn: &Connection, submission: &Submission) -> Result<()> {
        let body = serde_json::to_string(submission).context("failed to serialize submission")?;
        conn.execute(
            "INSERT INTO submissions (event_id, participant, body, locked, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(event_id, participant) DO UPDATE SET
                body       = excluded.body,
                locked     = excluded.locked,
                updated_at = excluded.updated_at",
            params![
                submission.event_id,
                submission.participant,
                body,
                submission.locked,
                submission.updated_at.to_rfc3339(),
            ],
        )
        .with_context(|| {
            format!(
                "failed to save submission {}/{}",
                submission.event_id, submission.participant
            )
        })?;
        Ok(())
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid timestamp '{value}'"))?
        .with_timezone(&Utc))
}

impl EventStore for Database {
    fn load_event(&self, event_id: &str) -> Result<Option<DraftEvent>> {
        let conn = self.conn();
        let snapshot: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM events WHERE id = ?1",
                params![event_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query event")?;

        let Some(snapshot) = snapshot else {
            return Ok(None);
        };
        let mut event: DraftEvent =
            serde_json::from_str(&snapshot).context("failed to deserialize event snapshot")?;
        event.picks = Self::query_picks(&conn, event_id)?;
        Ok(Some(event))
    }

    /// Persist the snapshot and replace the pick log in one transaction.
    fn save_event(&self, event: &DraftEvent) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        Self::write_event(&tx, event)?;
        tx.commit().context("failed to commit save_event")?;
        Ok(())
    }

    fn load_submission(&self, event_id: &str, participant: &str) -> Result<Option<Submission>> {
        let conn = self.conn();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM submissions WHERE event_id = ?1 AND participant = ?2",
                params![event_id, participant],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query submission")?;

        body.map(|b| serde_json::from_str(&b).context("failed to deserialize submission"))
            .transpose()
    }

    fn save_submission(&self, submission: &Submission) -> Result<()> {
        let conn = self.conn();
        Self::write_submission(&conn, submission)
    }

    fn load_submissions(&self, event_id: &str) -> Result<Vec<Submission>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT body FROM submissions WHERE event_id = ?1 ORDER BY participant")
            .context("failed to prepare load_submissions query")?;
        let bodies = stmt
            .query_map(params![event_id], |row| row.get::<_, String>(0))
            .context("failed to query submissions")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map submission rows")?;

        bodies
            .iter()
            .map(|b| serde_json::from_str(b).context("failed to deserialize submission"))
            .collect()
    }

    fn save_event_with_submissions(&self, event: &DraftEvent, submissions: &[Submission]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        Self::write_event(&tx, event)?;
        for submission in submissions {
            Self::write_submission(&tx, submission)?;
        }
        tx.commit().context("failed to commit save_event_with_submissions")?;
        Ok(())
    }

    /// Save a batch of submissions atomically.
    fn save_submissions(&self, submissions: &[Submission]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        for submission in submissions {
            Self::write_submission(&tx, submission)?;
        }
        tx.commit().context("failed to commit save_submissions")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::submission::SubmissionUpdate;

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    /// Helper: a drafting event with two teams, four players, and two picks.
    fn drafting_event() -> DraftEvent {
        let mut event = DraftEvent::new("ev", "Event");
        event.add_team("T1", &["ann".to_string()]).unwrap();
        event.add_team("T2", &[]).unwrap();
        for i in 1..=4 {
            event.add_player(&format!("P{i}"), Some("North".into()), None).unwrap();
        }
        event.open().unwrap();
        event.initialize(&[2, 1], 200).unwrap();
        event.make_pick(3, None).unwrap();
        event.make_pick(1, None).unwrap();
        event
    }

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"events".to_string()));
        assert!(tables.contains(&"draft_picks".to_string()));
        assert!(tables.contains(&"submissions".to_string()));
    }

    #[test]
    fn load_missing_event_returns_none() {
        let db = test_db();
        assert!(db.load_event("nope").unwrap().is_none());
    }

    #[test]
    fn save_and_load_event_with_picks() {
        let db = test_db();
        let event = drafting_event();
        db.save_event(&event).unwrap();

        let loaded = db.load_event("ev").unwrap().unwrap();
        assert_eq!(loaded.status, event.status);
        assert_eq!(loaded.teams, event.teams);
        assert_eq!(loaded.order, event.order);
        assert_eq!(loaded.picks.len(), 2);
        assert_eq!(loaded.picks[0].player_id, 3);
        assert_eq!(loaded.picks[1].pick_number, 2);
        assert_eq!(loaded.picks[0].made_at, event.picks[0].made_at);
        loaded.check_invariants().unwrap();
    }

    #[test]
    fn picks_stored_relationally() {
        let db = test_db();
        db.save_event(&drafting_event()).unwrap();
        let picks = db.load_picks("ev").unwrap();
        let teams: Vec<u32> = picks.iter().map(|p| p.team_id).collect();
        assert_eq!(teams, vec![2, 1]);

        let conn = db.conn();
        let snapshot: String = conn
            .query_row("SELECT snapshot FROM events WHERE id = 'ev'", [], |row| row.get(0))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(value["picks"], serde_json::json!([]));
    }

    #[test]
    fn save_event_replaces_pick_log_after_undo() {
        let db = test_db();
        let mut event = drafting_event();
        db.save_event(&event).unwrap();

        event.undo_last_pick().unwrap();
        db.save_event(&event).unwrap();

        let loaded = db.load_event("ev").unwrap().unwrap();
        assert_eq!(loaded.picks.len(), 1);
        loaded.check_invariants().unwrap();
    }

    #[test]
    fn duplicate_player_pick_rejected_by_schema() {
        let db = test_db();
        let mut event = drafting_event();
        let mut dup = event.picks[0].clone();
        dup.pick_number = 3;
        event.picks.push(dup);
        assert!(db.save_event(&event).is_err());
        // The failed transaction leaves nothing behind.
        assert!(db.load_event("ev").unwrap().is_none());
    }

    #[test]
    fn submission_round_trip_and_upsert() {
        let db = test_db();
        let mut event = DraftEvent::new("ev", "Event");
        event.add_team("T1", &[]).unwrap();
        event.add_player("P1", None, None).unwrap();
        event.open().unwrap();
        db.save_event(&event).unwrap();

        let mut sub = Submission::new("ev", "sam");
        let update = SubmissionUpdate {
            team_order: Some(vec![1]),
            placements: [(1, Some(1))].into_iter().collect(),
        };
        sub.apply(update, &event, Utc::now()).unwrap();
        db.save_submission(&sub).unwrap();

        sub.lock();
        db.save_submission(&sub).unwrap();

        let loaded = db.load_submission("ev", "sam").unwrap().unwrap();
        assert!(loaded.locked);
        assert_eq!(loaded.placements.get(&1), Some(&1));
        assert_eq!(db.load_submissions("ev").unwrap().len(), 1);
        assert!(db.load_submission("ev", "nobody").unwrap().is_none());
    }

    #[test]
    fn submission_requires_existing_event() {
        let db = test_db();
        assert!(db.save_submission(&Submission::new("ghost", "sam")).is_err());
    }

    #[test]
    fn save_submissions_batch() {
        let db = test_db();
        db.save_event(&DraftEvent::new("ev", "Event")).unwrap();
        let subs = vec![Submission::new("ev", "b"), Submission::new("ev", "a")];
        db.save_submissions(&subs).unwrap();
        let names: Vec<String> = db
            .load_submissions("ev")
            .unwrap()
            .into_iter()
            .map(|s| s.participant)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn event_and_submissions_saved_together() {
        let db = test_db();
        let mut event = DraftEvent::new("ev", "Event");
        db.save_event(&event).unwrap();
        db.save_submission(&Submission::new("ev", "sam")).unwrap();

        event.open().unwrap();
        let mut sub = Submission::new("ev", "sam");
        sub.lock();
        db.save_event_with_submissions(&event, &[sub]).unwrap();

        assert_eq!(db.load_event("ev").unwrap().unwrap().status, event.status);
        assert!(db.load_submission("ev", "sam").unwrap().unwrap().locked);
    }

    #[test]
    fn failed_submission_write_rolls_back_event() {
        let db = test_db();
        let mut event = DraftEvent::new("ev", "Event");
        db.save_event(&event).unwrap();

        event.open().unwrap();
        // The second submission points at a missing event and fails its
        // foreign key, so the status change must not stick either.
        let subs = vec![Submission::new("ev", "sam"), Submission::new("ghost", "sam")];
        assert!(db.save_event_with_submissions(&event, &subs).is_err());

        let loaded = db.load_event("ev").unwrap().unwrap();
        assert_eq!(loaded.status, crate::draft::event::EventStatus::Planned);
        assert!(db.load_submission("ev", "sam").unwrap().is_none());
    }
}
