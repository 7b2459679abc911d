use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use self::models::{OutboxEntry, OutboxStatus};
use crate::models::Decision;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("filesystem: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Config(String),
}

pub mod migrations;
pub mod models;
pub mod schema;

/// Entries kept in the ledger; older ones are pruned when it is opened.
pub const OUTBOX_RETENTION: usize = 1000;

const ENTRY_COLUMNS: &str = "id, message_id, thread_id, label, subject, sender, status, error, dispatched_at, completed_at";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutboxCounts {
    pub dispatched: i64,
    pub persisted: i64,
    pub failed: i64,
}

/// Local SQLite ledger of dispatched classifications.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        migrations::migrate(&conn)
            .map_err(|e| DbError::Config(format!("outbox migration failed: {e}")))?;

        let db = Self { conn };
        db.prune(OUTBOX_RETENTION)?;
        Ok(db)
    }

    pub fn default_db_path() -> Result<PathBuf, DbError> {
        crate::config::default_outbox_path()
            .ok_or_else(|| DbError::Config("failed to determine home directory".to_string()))
    }

    /// Records a persistence call about to be made. Returns the entry id.
    pub fn record_dispatch(&self, decision: &Decision) -> Result<String, DbError> {
        let id = Uuid::new_v4().to_string();
        let message = &decision.message;

        self.conn.execute(
            r#"
            INSERT INTO outbox (
                id, message_id, thread_id, label, subject, sender, status, dispatched_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                id,
                message.id,
                non_empty(&message.thread_id),
                decision.label.to_string(),
                non_empty(&message.subject),
                non_empty(&message.from),
                OutboxStatus::Dispatched.to_string(),
                now(),
            ],
        )?;

        Ok(id)
    }

    pub fn mark_persisted(&self, entry_id: &str) -> Result<(), DbError> {
        self.complete(entry_id, OutboxStatus::Persisted, None)
    }

    pub fn mark_failed(&self, entry_id: &str, error: &str) -> Result<(), DbError> {
        self.complete(entry_id, OutboxStatus::Failed, Some(error))
    }

    fn complete(
        &self,
        entry_id: &str,
        status: OutboxStatus,
        error: Option<&str>,
    ) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE outbox SET status = ?, error = ?, completed_at = ? WHERE id = ?",
            params![status.to_string(), error, now(), entry_id],
        )?;
        if updated == 0 {
            return Err(DbError::Config(format!("unknown outbox entry: {entry_id}")));
        }
        Ok(())
    }

    pub fn get_entry(&self, entry_id: &str) -> Result<Option<OutboxEntry>, DbError> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM outbox WHERE id = ? LIMIT 1");
        Ok(self
            .conn
            .query_row(&sql, [entry_id], OutboxEntry::from_row)
            .optional()?)
    }

    /// Most recent entries first.
    pub fn list_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>, DbError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM outbox ORDER BY dispatched_at DESC, rowid DESC LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map([limit as i64], OutboxEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Deletes all but the `keep` most recent entries. Returns the number
    /// removed.
    pub fn prune(&self, keep: usize) -> Result<usize, DbError> {
        let removed = self.conn.execute(
            r#"
            DELETE FROM outbox WHERE rowid NOT IN (
                SELECT rowid FROM outbox ORDER BY dispatched_at DESC, rowid DESC LIMIT ?
            )
            "#,
            [keep as i64],
        )?;
        Ok(removed)
    }

    pub fn counts(&self) -> Result<OutboxCounts, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM outbox GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = OutboxCounts::default();
        for (status, count) in rows {
            match status.parse::<OutboxStatus>() {
                Ok(OutboxStatus::Dispatched) => counts.dispatched = count,
                Ok(OutboxStatus::Persisted) => counts.persisted = count,
                Ok(OutboxStatus::Failed) => counts.failed = count,
                Err(_) => {}
            }
        }
        Ok(counts)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::Database;
    use crate::db::models::OutboxStatus;
    use crate::models::{Decision, Label, Message};
    use uuid::Uuid;

    fn temp_db_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("email-sorter-test-{}", Uuid::new_v4()))
            .join("outbox.db")
    }

    fn sample_decision(id: &str, label: Label) -> Decision {
        Decision::new(
            Message {
                id: id.to_string(),
                thread_id: format!("thread-{id}"),
                from: "Sender <sender@example.com>".to_string(),
                subject: "Quarterly report".to_string(),
                ..Message::default()
            },
            label,
        )
    }

    #[test]
    fn dispatch_then_persist_updates_status() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");

        let entry_id = db
            .record_dispatch(&sample_decision("m-1", Label::Good))
            .expect("record dispatch");
        let pending = db
            .get_entry(&entry_id)
            .expect("get entry")
            .expect("entry exists");
        assert_eq!(pending.status, OutboxStatus::Dispatched);
        assert_eq!(pending.label, Label::Good);
        assert_eq!(pending.thread_id.as_deref(), Some("thread-m-1"));
        assert!(pending.completed_at.is_none());

        db.mark_persisted(&entry_id).expect("mark persisted");
        let done = db
            .get_entry(&entry_id)
            .expect("get entry")
            .expect("entry exists");
        assert_eq!(done.status, OutboxStatus::Persisted);
        assert!(done.completed_at.is_some());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn failures_keep_the_error_and_show_in_counts() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");

        let first = db
            .record_dispatch(&sample_decision("m-1", Label::Bad))
            .expect("record first");
        let second = db
            .record_dispatch(&sample_decision("m-2", Label::Good))
            .expect("record second");
        db.mark_failed(&first, "request failed with status 500")
            .expect("mark failed");
        db.mark_persisted(&second).expect("mark persisted");

        let entries = db.list_outbox(10).expect("list outbox");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message_id, "m-2");
        let failed = entries
            .iter()
            .find(|entry| entry.message_id == "m-1")
            .expect("failed entry listed");
        assert_eq!(failed.status, OutboxStatus::Failed);
        assert_eq!(
            failed.error.as_deref(),
            Some("request failed with status 500")
        );

        let counts = db.counts().expect("counts");
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.persisted, 1);
        assert_eq!(counts.dispatched, 0);

        assert_eq!(db.list_outbox(1).expect("limited list").len(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn prune_keeps_most_recent_entries() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        for id in ["m-1", "m-2", "m-3", "m-4", "m-5"] {
            db.record_dispatch(&sample_decision(id, Label::Good))
                .expect("record dispatch");
        }

        assert_eq!(db.prune(2).expect("prune"), 3);
        let kept: Vec<String> = db
            .list_outbox(10)
            .expect("list outbox")
            .into_iter()
            .map(|entry| entry.message_id)
            .collect();
        assert_eq!(kept, vec!["m-5".to_string(), "m-4".to_string()]);
        assert_eq!(db.prune(2).expect("second prune"), 0);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn completing_unknown_entry_is_an_error() {
        let path = temp_db_path();
        let db = Database::open(&path).expect("open db");
        assert!(db.mark_persisted("missing").is_err());
        let _ = std::fs::remove_file(path);
    }
}
