use anyhow::Result;
use serde::Serialize;

use crate::auth::User;
use crate::db::models::OutboxEntry;
use crate::models::{Classification, Label};
use crate::output::preview::classification_preview;
use crate::session::SessionSnapshot;
use crate::thread::Conversation;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewItem<'a> {
    #[serde(flatten)]
    classification: &'a Classification,
    preview: String,
}

#[derive(Debug, Serialize)]
struct ReviewList<'a> {
    label: Label,
    count: usize,
    items: Vec<ReviewItem<'a>>,
}

pub fn format_card(snapshot: &SessionSnapshot) -> Result<String> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

pub fn format_review(label: Label, items: &[Classification]) -> Result<String> {
    let list = ReviewList {
        label,
        count: items.len(),
        items: items
            .iter()
            .map(|classification| ReviewItem {
                classification,
                preview: classification_preview(classification),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&list)?)
}

pub fn format_conversation(conversation: &Conversation) -> Result<String> {
    Ok(serde_json::to_string_pretty(conversation)?)
}

pub fn format_outbox(entries: &[OutboxEntry]) -> Result<String> {
    Ok(serde_json::to_string_pretty(entries)?)
}

pub fn format_user(user: Option<&User>) -> Result<String> {
    Ok(serde_json::to_string_pretty(&serde_json::json!({ "user": user }))?)
}
