pub mod json;
pub mod preview;
pub mod table;

use anyhow::Result;

use crate::auth::User;
use crate::db::models::OutboxEntry;
use crate::models::{Classification, Label};
use crate::session::SessionSnapshot;
use crate::thread::Conversation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Table
        }
    }
}

pub fn format_card(format: OutputFormat, snapshot: &SessionSnapshot) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_card(snapshot)),
        OutputFormat::Json => json::format_card(snapshot),
    }
}

pub fn format_review(format: OutputFormat, label: Label, items: &[Classification]) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_review(label, items)),
        OutputFormat::Json => json::format_review(label, items),
    }
}

pub fn format_conversation(format: OutputFormat, conversation: &Conversation) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_conversation(conversation)),
        OutputFormat::Json => json::format_conversation(conversation),
    }
}

pub fn format_outbox(format: OutputFormat, entries: &[OutboxEntry]) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_outbox(entries)),
        OutputFormat::Json => json::format_outbox(entries),
    }
}

pub fn format_user(format: OutputFormat, user: Option<&User>) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_user(user)),
        OutputFormat::Json => json::format_user(user),
    }
}
