use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rusqlite::{Result as SqlResult, Row};
use serde::{Deserialize, Serialize};

use crate::models::Label;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Dispatched,
    Persisted,
    Failed,
}

impl Display for OutboxStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dispatched => write!(f, "dispatched"),
            Self::Persisted => write!(f, "persisted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dispatched" | "pending" => Ok(Self::Dispatched),
            "persisted" | "ok" => Ok(Self::Persisted),
            "failed" => Ok(Self::Failed),
            other => Err(format!("invalid outbox status: {other}")),
        }
    }
}

/// One persistence call as recorded in the local ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxEntry {
    pub id: String,
    pub message_id: String,
    pub thread_id: Option<String>,
    pub label: Label,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub status: OutboxStatus,
    pub error: Option<String>,
    pub dispatched_at: String,
    pub completed_at: Option<String>,
}

impl OutboxEntry {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            message_id: row.get("message_id")?,
            thread_id: row.get("thread_id")?,
            label: parse_column(row, "label")?,
            subject: row.get("subject")?,
            sender: row.get("sender")?,
            status: parse_column(row, "status")?,
            error: row.get("error")?,
            dispatched_at: row.get("dispatched_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

fn parse_column<T>(row: &Row<'_>, column: &str) -> SqlResult<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(column)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            raw.len(),
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}
