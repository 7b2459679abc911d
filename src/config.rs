use std::path::PathBuf;

pub const DEFAULT_API_BASE: &str = "http://localhost:5050";
pub const API_BASE_ENV: &str = "EMAIL_SORTER_API_BASE";
pub const SESSION_COOKIE_ENV: &str = "EMAIL_SORTER_SESSION";
pub const OUTBOX_PATH_ENV: &str = "EMAIL_SORTER_OUTBOX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_base: String,
    /// Raw `Cookie` header value carrying the service session.
    pub session_cookie: Option<String>,
    /// SQLite path of the dispatch outbox; `None` disables it.
    pub outbox_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            session_cookie: None,
            outbox_path: None,
        }
    }
}

impl Config {
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

pub fn default_outbox_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".email-sorter").join("outbox.db"))
}
