//! In-memory [`MailService`] used by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::auth::User;
use crate::filters::Filter;
use crate::models::{Decision, Message, StoredClassification};
use crate::service::{MailService, MessageBatch, ServiceError};

/// A scripted fetch result plus an optional gate holding it back.
type QueuedBatch = (Result<MessageBatch, ServiceError>, Option<Arc<Notify>>);

#[derive(Default)]
pub(crate) struct FakeService {
    pub(crate) user: Mutex<Option<User>>,
    pub(crate) batches: Mutex<VecDeque<QueuedBatch>>,
    pub(crate) stored: Mutex<Vec<StoredClassification>>,
    pub(crate) threads: Mutex<Vec<Message>>,
    pub(crate) filters_seen: Mutex<Vec<Filter>>,
    pub(crate) posted: Mutex<Vec<Decision>>,
    /// When set, message fetches block until notified.
    pub(crate) gate: Option<Arc<Notify>>,
}

impl FakeService {
    pub(crate) fn signed_in(email: &str) -> Self {
        Self {
            user: Mutex::new(Some(User::new(email))),
            ..Self::default()
        }
    }

    pub(crate) fn push_batch(&self, ids: &[&str]) {
        self.batches
            .lock()
            .expect("batches lock")
            .push_back((Ok(batch(ids)), None));
    }

    /// Queues a batch whose fetch blocks until the returned gate is notified.
    pub(crate) fn push_gated_batch(&self, ids: &[&str]) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.batches
            .lock()
            .expect("batches lock")
            .push_back((Ok(batch(ids)), Some(gate.clone())));
        gate
    }

    pub(crate) fn push_error(&self, err: ServiceError) {
        self.batches
            .lock()
            .expect("batches lock")
            .push_back((Err(err), None));
    }
}

fn batch(ids: &[&str]) -> MessageBatch {
    MessageBatch {
        messages: ids.iter().map(|id| message(id)).collect(),
        ..MessageBatch::default()
    }
}

pub(crate) fn message(id: &str) -> Message {
    Message {
        id: id.to_string(),
        thread_id: format!("t-{id}"),
        subject: format!("Subject {id}"),
        snippet: format!("snippet {id}"),
        ..Message::default()
    }
}

#[async_trait]
impl MailService for FakeService {
    async fn fetch_messages(&self, filter: &Filter) -> Result<MessageBatch, ServiceError> {
        self.filters_seen
            .lock()
            .expect("filters lock")
            .push(filter.clone());
        let (next, batch_gate) = self
            .batches
            .lock()
            .expect("batches lock")
            .pop_front()
            .unwrap_or_else(|| (Ok(MessageBatch::default()), None));
        if let Some(gate) = batch_gate {
            gate.notified().await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        next
    }

    async fn fetch_classifications(&self) -> Result<Vec<StoredClassification>, ServiceError> {
        Ok(self.stored.lock().expect("stored lock").clone())
    }

    async fn create_classification(&self, decision: &Decision) -> Result<(), ServiceError> {
        self.posted
            .lock()
            .expect("posted lock")
            .push(decision.clone());
        Ok(())
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<Vec<Message>, ServiceError> {
        let thread: Vec<Message> = self
            .threads
            .lock()
            .expect("threads lock")
            .iter()
            .filter(|message| message.thread_id == thread_id)
            .cloned()
            .collect();
        if thread.is_empty() {
            return Err(ServiceError::Status {
                status: 404,
                message: "thread not found".to_string(),
            });
        }
        Ok(thread)
    }

    async fn current_user(&self) -> Result<Option<User>, ServiceError> {
        Ok(self.user.lock().expect("user lock").clone())
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        *self.user.lock().expect("user lock") = None;
        Ok(())
    }
}
