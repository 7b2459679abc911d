use chrono::{DateTime, Utc};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::auth::User;
use crate::db::models::OutboxEntry;
use crate::models::{Classification, FetchSummary, Label};
use crate::output::preview::{classification_preview, plain_text};
use crate::session::SessionSnapshot;
use crate::thread::{display_body, Conversation};

const FROM_WIDTH: usize = 24;
const SUBJECT_WIDTH: usize = 44;
const PREVIEW_WIDTH: usize = 48;
const DATE_WIDTH: usize = 12;
const STATUS_WIDTH: usize = 10;
const LABEL_WIDTH: usize = 5;

pub fn format_card(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();

    if let Some(error) = &snapshot.error {
        out.push_str(&format!("Error: {error}\n\n"));
    }
    if let Some(line) = snapshot.summary.as_ref().and_then(format_summary) {
        out.push_str(&line);
        out.push_str("\n\n");
    }

    let Some(head) = &snapshot.head else {
        if snapshot.loading && !snapshot.initialized {
            out.push_str("Loading your inbox…\n");
        } else {
            out.push_str("You're all caught up!\n");
            out.push_str("No more emails in the queue. Refresh to fetch the latest inbox.\n");
        }
        return out;
    };

    out.push_str(&format!("Subject: {}\n", or_placeholder(&head.subject, "(no subject)")));
    out.push_str(&format!("From: {}\n", or_placeholder(&head.from, "(unknown)")));
    if let Some(to) = head.to.as_deref().filter(|to| !to.is_empty()) {
        out.push_str(&format!("To: {to}\n"));
    }
    if let Some(date) = head.date.as_deref() {
        out.push_str(&format!("Date: {} ({})\n", date, relative_date(date)));
    }
    if !head.label_ids.is_empty() {
        out.push_str(&format!("Labels: {}\n", head.label_ids.join(", ")));
    }

    out.push('\n');
    let body = plain_text(display_body(head));
    out.push_str(if body.is_empty() { "(empty)" } else { body.as_str() });
    out.push_str("\n\n");
    out.push_str(&format!("Remaining emails: {}\n", snapshot.after_head()));
    out
}

/// Notice shown when fewer messages arrived than were requested.
pub fn format_summary(summary: &FetchSummary) -> Option<String> {
    let requested = summary.requested?;
    summary.shortfall()?;
    Some(format!(
        "Loaded {} emails. Some of the {} requested were already triaged or not available, \
         so they remain in your Good/Bad lists.",
        summary.delivered, requested
    ))
}

pub fn format_review(label: Label, items: &[Classification]) -> String {
    let title = match label {
        Label::Good => "Good emails",
        Label::Bad => "Bad emails",
    };
    if items.is_empty() {
        return format!("You haven't marked any emails as {label} yet.");
    }

    let mut out = format!("{title} ({})\n\n", items.len());
    out.push_str(&format!(
        "{:<from$}  {:<subject$}  {:<preview$}\n",
        "From",
        "Subject",
        "Preview",
        from = FROM_WIDTH,
        subject = SUBJECT_WIDTH,
        preview = PREVIEW_WIDTH
    ));
    out.push_str(&format!(
        "{}  {}  {}\n",
        "-".repeat(FROM_WIDTH),
        "-".repeat(SUBJECT_WIDTH),
        "-".repeat(PREVIEW_WIDTH)
    ));

    for item in items {
        out.push_str(&format!(
            "{}  {}  {}\n",
            pad_to_width(&truncate_for_width(&item.from, FROM_WIDTH), FROM_WIDTH),
            pad_to_width(&truncate_for_width(&item.subject, SUBJECT_WIDTH), SUBJECT_WIDTH),
            truncate_for_width(&classification_preview(item), PREVIEW_WIDTH)
        ));
    }

    out
}

pub fn format_conversation(conversation: &Conversation) -> String {
    let mut out = format!("Conversation messages: {}\n", conversation.len());
    if conversation.fallback {
        out.push_str("(thread unavailable, showing the current email only)\n");
    }

    for message in &conversation.messages {
        out.push('\n');
        out.push_str(&"-".repeat(80));
        out.push('\n');
        out.push_str(&format!("From: {}\n", or_placeholder(&message.from, "(unknown)")));
        if let Some(to) = message.to.as_deref().filter(|to| !to.is_empty()) {
            out.push_str(&format!("To: {to}\n"));
        }
        if let Some(date) = message.date.as_deref() {
            out.push_str(&format!("Date: {date}\n"));
        }
        out.push('\n');
        out.push_str(&plain_text(display_body(message)));
        out.push('\n');
    }
    out
}

pub fn format_outbox(entries: &[OutboxEntry]) -> String {
    if entries.is_empty() {
        return "Outbox is empty.".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<label$}  {:<status$}  {:<subject$}  {:<date$}  Error\n",
        "Label",
        "Status",
        "Subject",
        "Sent",
        label = LABEL_WIDTH,
        status = STATUS_WIDTH,
        subject = SUBJECT_WIDTH,
        date = DATE_WIDTH
    ));
    out.push_str(&format!(
        "{}  {}  {}  {}  -----\n",
        "-".repeat(LABEL_WIDTH),
        "-".repeat(STATUS_WIDTH),
        "-".repeat(SUBJECT_WIDTH),
        "-".repeat(DATE_WIDTH)
    ));

    for entry in entries {
        let subject = entry.subject.as_deref().unwrap_or(&entry.message_id);
        out.push_str(&format!(
            "{:<label$}  {:<status$}  {}  {:<date$}  {}\n",
            entry.label.to_string(),
            entry.status.to_string(),
            pad_to_width(&truncate_for_width(subject, SUBJECT_WIDTH), SUBJECT_WIDTH),
            truncate_for_width(&relative_date(&entry.dispatched_at), DATE_WIDTH),
            entry.error.as_deref().unwrap_or("-"),
            label = LABEL_WIDTH,
            status = STATUS_WIDTH,
            date = DATE_WIDTH
        ));
    }

    out
}

pub fn format_user(user: Option<&User>) -> String {
    match user {
        Some(user) if user.display_name() != user.email => {
            format!("Signed in as {} <{}>", user.display_name(), user.email)
        }
        Some(user) => format!("Signed in as {}", user.email),
        None => "Not signed in.".to_string(),
    }
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

fn relative_date(input: &str) -> String {
    let parsed = match DateTime::parse_from_rfc3339(input)
        .or_else(|_| DateTime::parse_from_rfc2822(input))
    {
        Ok(value) => value.with_timezone(&Utc),
        Err(_) => return input.to_string(),
    };

    let delta = Utc::now().signed_duration_since(parsed);
    if delta.num_seconds() < 0 {
        return "in future".to_string();
    }
    if delta.num_minutes() < 1 {
        return "just now".to_string();
    }
    if delta.num_hours() < 1 {
        return format!("{}m ago", delta.num_minutes());
    }
    if delta.num_hours() < 24 {
        return format!("{}h ago", delta.num_hours());
    }
    if delta.num_days() == 1 {
        return "yesterday".to_string();
    }
    if delta.num_days() < 7 {
        return format!("{}d ago", delta.num_days());
    }
    parsed.format("%Y-%m-%d").to_string()
}

fn truncate_for_width(value: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(value) <= max_width {
        return value.to_string();
    }
    if max_width <= 1 {
        return "…".to_string();
    }

    let mut out = String::new();
    let mut width = 0usize;
    for c in value.chars() {
        let cw = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + cw + 1 > max_width {
            break;
        }
        out.push(c);
        width += cw;
    }
    out.push('…');
    out
}

/// Left-aligns by display width; `format!` padding counts chars instead.
fn pad_to_width(value: &str, width: usize) -> String {
    let used = UnicodeWidthStr::width(value);
    format!("{value}{}", " ".repeat(width.saturating_sub(used)))
}
