use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

pub const MIN_MAX_RESULTS: u32 = 1;
pub const MAX_MAX_RESULTS: u32 = 500;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// A result cap as typed by the user: either a number or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxResultsInput {
    Number(f64),
    Text(String),
}

impl From<&str> for MaxResultsInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u32> for MaxResultsInput {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

/// Unvalidated filter input. `None` means "keep the current value" when used
/// as an override; `Some("")` clears the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFilter {
    #[serde(default)]
    pub max_results: Option<MaxResultsInput>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

impl RawFilter {
    /// An override that clears every field.
    pub fn cleared() -> Self {
        Self {
            max_results: Some(MaxResultsInput::Text(String::new())),
            since: Some(String::new()),
            until: Some(String::new()),
            label: Some(String::new()),
            search: Some(String::new()),
        }
    }

    /// Layers `overrides` on top of `self`, field by field.
    pub fn overlay(self, overrides: RawFilter) -> RawFilter {
        RawFilter {
            max_results: overrides.max_results.or(self.max_results),
            since: overrides.since.or(self.since),
            until: overrides.until.or(self.until),
            label: overrides.label.or(self.label),
            search: overrides.search.or(self.search),
        }
    }

    /// Parses `key=value` overrides typed at a prompt. `search` takes the
    /// rest of the line verbatim, spaces included, so it must come last.
    pub fn parse_assignments(input: &str) -> Result<Self, String> {
        let mut overrides = Self::default();
        let mut rest = input.trim_start();

        while !rest.is_empty() {
            let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            let word = &rest[..word_end];
            let (key, value) = word
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{word}'"))?;

            match key {
                "search" | "q" => {
                    overrides.search = Some(rest[key.len() + 1..].trim_end().to_string());
                    break;
                }
                "max" | "maxResults" | "max_results" => {
                    overrides.max_results = Some(MaxResultsInput::from(value));
                }
                "since" => overrides.since = Some(value.to_string()),
                "until" => overrides.until = Some(value.to_string()),
                "label" | "labels" => overrides.label = Some(value.to_string()),
                other => return Err(format!("unknown filter '{other}'")),
            }
            rest = rest[word_end..].trim_start();
        }

        Ok(overrides)
    }

    pub fn is_empty(&self) -> bool {
        self.max_results.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && self.label.is_none()
            && self.search.is_none()
    }
}

/// Canonical query filter. Always satisfies `since <= until` when both are set
/// and keeps `max_results` within `[1, 500]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub max_results: Option<u32>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub labels: Vec<String>,
    pub search: Option<String>,
}

impl Filter {
    pub fn to_raw(&self) -> RawFilter {
        RawFilter {
            max_results: self.max_results.map(MaxResultsInput::from),
            since: self.since.map(format_date),
            until: self.until.map(format_date),
            label: (!self.labels.is_empty()).then(|| self.label_text()),
            search: self.search.clone(),
        }
    }

    pub fn label_text(&self) -> String {
        self.labels.join(",")
    }

    pub fn is_empty(&self) -> bool {
        self == &Filter::default()
    }

    /// Query parameters for the message fetch. Unset fields are omitted.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();

        if let Some(max_results) = self.max_results {
            params.push(("maxResults", max_results.to_string()));
        }
        if let Some(search) = self.search.as_deref() {
            params.push(("search", search.to_string()));
        }
        if !self.labels.is_empty() {
            params.push(("labelIds", self.label_text()));
        }
        if let Some(since) = self.since {
            params.push(("since", format_date(since)));
        }
        if let Some(until) = self.until {
            params.push(("until", format_date(until)));
        }

        params
    }
}

/// Validates and clamps raw filter input. Never fails: anything unusable is
/// dropped to "unset".
pub fn normalize(raw: &RawFilter) -> Filter {
    let mut since = raw.since.as_deref().and_then(parse_date);
    let mut until = raw.until.as_deref().and_then(parse_date);

    if let (Some(start), Some(end)) = (since, until) {
        if start > end {
            since = Some(end);
            until = Some(start);
        }
    }

    Filter {
        max_results: raw.max_results.as_ref().and_then(normalize_max_results),
        since,
        until,
        labels: raw.label.as_deref().map(split_labels).unwrap_or_default(),
        search: raw
            .search
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string),
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn normalize_max_results(input: &MaxResultsInput) -> Option<u32> {
    let value = match input {
        MaxResultsInput::Number(value) => *value,
        MaxResultsInput::Text(text) => parse_leading_integer(text)?,
    };
    clamp_max_results(value)
}

fn clamp_max_results(value: f64) -> Option<u32> {
    if !value.is_finite() {
        return None;
    }
    let clamped = value
        .floor()
        .clamp(f64::from(MIN_MAX_RESULTS), f64::from(MAX_MAX_RESULTS));
    Some(clamped as u32)
}

/// Reads an optional sign followed by decimal digits, ignoring whatever
/// trails them (`"12abc"` is 12, `"3.9"` is 3).
fn parse_leading_integer(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1.0, &trimmed[1..]),
        Some(b'+') => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };

    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }

    rest[..digits_len]
        .parse::<f64>()
        .ok()
        .map(|magnitude| sign * magnitude)
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|timestamp| timestamp.date_naive())
        })
}

fn split_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
