use serde::Serialize;

use crate::models::Message;

/// The messages shown in the detail view of the current card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub thread_id: String,
    pub messages: Vec<Message>,
    /// `true` when the thread could not be loaded and only the head is shown.
    pub fallback: bool,
}

impl Conversation {
    /// Combines a thread fetch with the card it was requested for. An empty
    /// or missing thread degrades to the card's own message.
    pub fn assemble(head: &Message, thread: Option<Vec<Message>>) -> Self {
        match thread.filter(|messages| !messages.is_empty()) {
            Some(messages) => Self {
                thread_id: head.thread_id.clone(),
                messages,
                fallback: false,
            },
            None => Self {
                thread_id: head.thread_id.clone(),
                messages: vec![standalone(head)],
                fallback: true,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Text to display for one message: body, else snippet.
pub fn display_body(message: &Message) -> &str {
    if message.body.is_empty() {
        &message.snippet
    } else {
        &message.body
    }
}

fn standalone(head: &Message) -> Message {
    Message {
        body: display_body(head).to_string(),
        label_ids: Vec::new(),
        ..head.clone()
    }
}
