use serde::{Deserialize, Serialize};

/// The signed-in account as reported by the service's `/me` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            picture: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }

    /// Two-letter avatar fallback when there is no picture.
    pub fn initials(&self) -> String {
        let source = self.display_name();
        let initials: String = source.chars().take(2).collect();
        if initials.is_empty() {
            "?".to_string()
        } else {
            initials.to_uppercase()
        }
    }

    /// Identity used to detect that the active account changed.
    pub fn identity(&self) -> &str {
        &self.email
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct MeResponse {
    #[serde(default)]
    pub user: Option<User>,
}
