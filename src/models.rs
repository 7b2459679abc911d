use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

const NO_SUBJECT: &str = "(no subject)";
const UNKNOWN_SENDER: &str = "Unknown sender";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Good,
    Bad,
}

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Good => write!(f, "good"),
            Self::Bad => write!(f, "bad"),
        }
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "good" | "right" | "keep" => Ok(Self::Good),
            "bad" | "left" | "dismiss" => Ok(Self::Bad),
            other => Err(format!("invalid label: {other}")),
        }
    }
}

/// A message as delivered by the mail service.
///
/// Only `id` is required on the wire. Missing or `null` text fields decode to
/// empty strings and a missing label list decodes to an empty list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thread_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub snippet: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label_ids: Vec<String>,
}

/// A persisted triage decision. `id` is the id of the classified message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub id: String,
    pub label: Label,
    pub subject: String,
    pub from: String,
    pub snippet: String,
    pub body: String,
    pub date: Option<String>,
    pub label_ids: Vec<String>,
}

impl Classification {
    pub fn from_message(message: Message, label: Label) -> Self {
        Self {
            id: message.id,
            label,
            subject: message.subject,
            from: message.from,
            snippet: message.snippet,
            body: message.body,
            date: message.date,
            label_ids: message.label_ids,
        }
    }

    /// Overwrites display fields with the non-empty values of a fresher copy
    /// of the same message. The label is never touched.
    pub fn backfill_from(&mut self, message: &Message) {
        if !message.subject.is_empty() {
            self.subject.clone_from(&message.subject);
        }
        if !message.from.is_empty() {
            self.from.clone_from(&message.from);
        }
        if !message.snippet.is_empty() {
            self.snippet.clone_from(&message.snippet);
        }
        if !message.body.is_empty() {
            self.body.clone_from(&message.body);
        }
        if let Some(date) = message.date.as_deref().filter(|value| !value.is_empty()) {
            self.date = Some(date.to_string());
        }
        if !message.label_ids.is_empty() {
            self.label_ids.clone_from(&message.label_ids);
        }
    }
}

/// A label applied to a message: the payload of one persistence call.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Decision {
    #[serde(flatten)]
    pub message: Message,
    pub label: Label,
}

impl Decision {
    pub fn new(message: Message, label: Label) -> Self {
        Self { message, label }
    }

    pub fn classification(&self) -> Classification {
        Classification::from_message(self.message.clone(), self.label)
    }
}

/// Classification record as returned by the remote store, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredClassification {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub label_ids: Option<Vec<String>>,
}

impl StoredClassification {
    /// Returns `None` for records without an id or with an unrecognized label.
    pub fn normalize(self) -> Option<Classification> {
        let id = self.id.filter(|value| !value.trim().is_empty())?;
        let label = self.label.as_deref().and_then(|raw| match raw {
            "good" => Some(Label::Good),
            "bad" => Some(Label::Bad),
            _ => None,
        })?;

        Some(Classification {
            id,
            label,
            subject: non_empty_or(self.subject, NO_SUBJECT),
            from: non_empty_or(self.from, UNKNOWN_SENDER),
            snippet: self.snippet.unwrap_or_default(),
            body: self.body.unwrap_or_default(),
            date: self.date.filter(|value| !value.is_empty()),
            label_ids: self.label_ids.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchSummary {
    pub requested: Option<u32>,
    pub delivered: usize,
}

impl FetchSummary {
    /// Number of requested messages that were not delivered, when known.
    pub fn shortfall(&self) -> Option<usize> {
        let requested = self.requested? as usize;
        (self.delivered < requested).then(|| requested - self.delivered)
    }
}

fn non_empty_or(value: Option<String>, fallback: &str) -> String {
    value
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
