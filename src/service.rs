use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::{MeResponse, User};
use crate::config::{Config, DEFAULT_API_BASE};
use crate::filters::Filter;
use crate::models::{null_as_default, Decision, FetchSummary, Message, StoredClassification};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not signed in")]
    Unauthenticated,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("decode {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid api base url: {0}")]
    InvalidBaseUrl(String),
}

impl ServiceError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated)
    }
}

/// One page of messages from `GET /emails`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageBatch {
    #[serde(default, alias = "emails", deserialize_with = "null_as_default")]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub requested: Option<u32>,
    #[serde(default)]
    pub delivered: Option<usize>,
}

impl MessageBatch {
    pub fn delivered(&self) -> usize {
        self.delivered.unwrap_or(self.messages.len())
    }

    /// Summary of this batch; `requested` falls back to the filter's limit.
    pub fn summary(&self, filter: &Filter) -> FetchSummary {
        FetchSummary {
            requested: self.requested.or(filter.max_results),
            delivered: self.delivered(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ClassificationList {
    #[serde(default, deserialize_with = "null_as_default")]
    items: Vec<StoredClassification>,
}

#[derive(Debug, Default, Deserialize)]
struct ThreadResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    messages: Vec<Message>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Remote classification and mailbox service.
#[async_trait]
pub trait MailService: Send + Sync {
    async fn fetch_messages(&self, filter: &Filter) -> Result<MessageBatch, ServiceError>;

    async fn fetch_classifications(&self) -> Result<Vec<StoredClassification>, ServiceError>;

    async fn create_classification(&self, decision: &Decision) -> Result<(), ServiceError>;

    async fn fetch_thread(&self, thread_id: &str) -> Result<Vec<Message>, ServiceError>;

    /// The signed-in user, or `None` when the session is missing or expired.
    async fn current_user(&self) -> Result<Option<User>, ServiceError>;

    async fn sign_out(&self) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
pub struct HttpMailService {
    http: Client,
    api_base: String,
    session_cookie: Option<String>,
}

impl Default for HttpMailService {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl HttpMailService {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            session_cookie: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let service = Self::default().with_api_base(&config.api_base);
        match &config.session_cookie {
            Some(cookie) => service.with_session_cookie(cookie),
            None => service,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Builds `{api_base}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let invalid = || ServiceError::InvalidBaseUrl(self.api_base.clone());
        let mut url = Url::parse(&self.api_base).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.session_cookie {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, ServiceError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(ServiceError::Unauthenticated);
        }
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }
        Ok(body)
    }

    async fn send_json<T>(
        &self,
        request: RequestBuilder,
        context: &'static str,
    ) -> Result<T, ServiceError>
    where
        T: DeserializeOwned + Default,
    {
        let body = self.send(request).await?;
        if body.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&body).map_err(|source| ServiceError::Decode { context, source })
    }
}

#[async_trait]
impl MailService for HttpMailService {
    async fn fetch_messages(&self, filter: &Filter) -> Result<MessageBatch, ServiceError> {
        let url = self.endpoint(&["emails"])?;
        let request = self.http.get(url).query(&filter.query_params());
        self.send_json(request, "email batch").await
    }

    async fn fetch_classifications(&self) -> Result<Vec<StoredClassification>, ServiceError> {
        let url = self.endpoint(&["classifications"])?;
        let list: ClassificationList = self
            .send_json(self.http.get(url), "classification list")
            .await?;
        Ok(list.items)
    }

    async fn create_classification(&self, decision: &Decision) -> Result<(), ServiceError> {
        let url = self.endpoint(&["classifications"])?;
        self.send(self.http.post(url).json(decision)).await?;
        Ok(())
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<Vec<Message>, ServiceError> {
        let url = self.endpoint(&["threads", thread_id])?;
        let thread: ThreadResponse = self.send_json(self.http.get(url), "thread").await?;
        Ok(thread.messages)
    }

    async fn current_user(&self) -> Result<Option<User>, ServiceError> {
        let url = self.endpoint(&["me"])?;
        match self
            .send_json::<MeResponse>(self.http.get(url), "current user")
            .await
        {
            Ok(me) => Ok(me.user),
            Err(ServiceError::Unauthenticated) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        let url = self.endpoint(&["logout"])?;
        self.send(self.http.post(url)).await?;
        Ok(())
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()))
}
