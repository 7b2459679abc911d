//! Session-scoped triage state.
//!
//! [`TriageSession`] owns the queue and review lists, the active filter, the
//! last fetch summary and the card gesture. All state sits behind one mutex
//! that is only ever held for synchronous updates.

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::User;
use crate::dispatch::Dispatcher;
use crate::filters::{self, Filter, RawFilter};
use crate::gesture::{CardFeedback, GestureEnd, GestureInterpreter, PointerId, PointerTarget};
use crate::models::{Classification, Decision, FetchSummary, Label, Message};
use crate::queue::TriageQueue;
use crate::reconcile::reconcile;
use crate::service::{MailService, ServiceError};
use crate::thread::Conversation;

pub const SESSION_EXPIRED_MESSAGE: &str = "Your session expired. Please sign in again.";

/// Why the last fetch did not update the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    SessionExpired,
    Fetch(String),
}

impl FetchFailure {
    pub fn message(&self) -> &str {
        match self {
            Self::SessionExpired => SESSION_EXPIRED_MESSAGE,
            Self::Fetch(message) => message,
        }
    }
}

impl Display for FetchFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl From<&ServiceError> for FetchFailure {
    fn from(err: &ServiceError) -> Self {
        if err.is_unauthenticated() {
            Self::SessionExpired
        } else {
            Self::Fetch(err.to_string())
        }
    }
}

/// Result of one fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied(FetchSummary),
    Failed(FetchFailure),
    /// A newer fetch, a user switch or a cancel superseded this one.
    Stale,
    SignedOut,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureOutcome {
    pub end: GestureEnd,
    pub decision: Option<Decision>,
}

/// Read-only view of the session for presentation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub filter: Filter,
    pub head: Option<Message>,
    pub remaining: usize,
    pub good: Vec<Classification>,
    pub bad: Vec<Classification>,
    pub summary: Option<FetchSummary>,
    pub loading: bool,
    pub error: Option<String>,
    pub session_expired: bool,
    pub initialized: bool,
    pub card: CardFeedback,
    pub in_flight: usize,
}

impl SessionSnapshot {
    /// Messages queued behind the current card.
    pub fn after_head(&self) -> usize {
        self.remaining.saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FetchTicket {
    generation: u64,
    user: String,
}

#[derive(Debug, Default)]
struct SessionState {
    user: Option<User>,
    filter: Filter,
    queue: TriageQueue,
    summary: Option<FetchSummary>,
    loading: bool,
    last_error: Option<FetchFailure>,
    initialized: bool,
    generation: u64,
    gesture: GestureInterpreter,
}

impl SessionState {
    fn accepts(&self, ticket: &FetchTicket) -> bool {
        self.generation == ticket.generation
            && self.user.as_ref().map(User::identity) == Some(ticket.user.as_str())
    }

    fn reset_for_user(&mut self, user: Option<User>) {
        *self = Self {
            user,
            generation: self.generation + 1,
            ..Self::default()
        };
    }
}

#[derive(Clone)]
pub struct TriageSession {
    service: Arc<dyn MailService>,
    dispatcher: Dispatcher,
    state: Arc<Mutex<SessionState>>,
}

impl TriageSession {
    pub fn new(service: Arc<dyn MailService>) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&service));
        Self::with_dispatcher(service, dispatcher)
    }

    pub fn with_dispatcher(service: Arc<dyn MailService>, dispatcher: Dispatcher) -> Self {
        Self {
            service,
            dispatcher,
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    /// Loads the current user and, when signed in, runs the first fetch.
    pub async fn sign_in(&self) -> Result<Option<User>, ServiceError> {
        self.sign_in_with(RawFilter::default()).await
    }

    /// Like [`sign_in`](Self::sign_in), with filter overrides applied to the
    /// first fetch.
    pub async fn sign_in_with(&self, overrides: RawFilter) -> Result<Option<User>, ServiceError> {
        let user = self.service.current_user().await?;
        self.set_user(user.clone());
        if user.is_some() {
            self.fetch(overrides).await;
        }
        Ok(user)
    }

    /// Switches the active user. A different identity discards all triage
    /// state and invalidates any fetch still in flight.
    pub fn set_user(&self, user: Option<User>) {
        let mut state = self.lock();
        let changed = state.user.as_ref().map(User::identity) != user.as_ref().map(User::identity);
        if changed {
            debug!(
                "active user changed to {}",
                user.as_ref().map(User::identity).unwrap_or("<none>")
            );
            state.reset_for_user(user);
        } else {
            state.user = user;
        }
    }

    /// Re-reads the user from the service. Any failure counts as signed out.
    pub async fn refresh_auth(&self) -> Option<User> {
        let user = match self.service.current_user().await {
            Ok(user) => user,
            Err(err) => {
                warn!("failed to refresh session: {err}");
                None
            }
        };
        self.set_user(user.clone());
        user
    }

    pub async fn sign_out(&self) {
        if let Err(err) = self.service.sign_out().await {
            warn!("logout request failed: {err}");
        }
        self.set_user(None);
    }

    pub async fn apply_filters(&self, overrides: RawFilter) -> FetchOutcome {
        self.fetch(overrides).await
    }

    pub async fn reset_filters(&self) -> FetchOutcome {
        self.fetch(RawFilter::cleared()).await
    }

    pub async fn refresh(&self) -> FetchOutcome {
        self.fetch(RawFilter::default()).await
    }

    /// Drops interest in any fetch still in flight.
    pub fn cancel_pending(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.loading = false;
    }

    async fn fetch(&self, overrides: RawFilter) -> FetchOutcome {
        let (ticket, filter) = {
            let mut state = self.lock();
            let Some(identity) = state.user.as_ref().map(|user| user.identity().to_string())
            else {
                return FetchOutcome::SignedOut;
            };

            let filter = filters::normalize(&state.filter.to_raw().overlay(overrides));
            state.generation += 1;
            state.filter = filter.clone();
            state.loading = true;
            state.last_error = None;
            let ticket = FetchTicket {
                generation: state.generation,
                user: identity,
            };
            (ticket, filter)
        };

        debug!("fetching messages (generation {})", ticket.generation);
        let result = tokio::try_join!(
            self.service.fetch_messages(&filter),
            self.service.fetch_classifications()
        );

        match result {
            Ok((batch, stored)) => {
                let summary = batch.summary(&filter);
                let reconciled = reconcile(batch.messages, stored);

                let mut state = self.lock();
                if !state.accepts(&ticket) {
                    debug!("discarding stale fetch (generation {})", ticket.generation);
                    return FetchOutcome::Stale;
                }
                info!(
                    "fetched {} messages: {} pending, {} good, {} bad",
                    summary.delivered,
                    reconciled.queue.len(),
                    reconciled.good.len(),
                    reconciled.bad.len()
                );
                state.queue.replace(reconciled);
                state.summary = Some(summary);
                state.loading = false;
                state.initialized = true;
                state.gesture.reset();
                FetchOutcome::Applied(summary)
            }
            Err(err) => {
                let failure = FetchFailure::from(&err);
                {
                    let mut state = self.lock();
                    if !state.accepts(&ticket) {
                        debug!(
                            "discarding stale fetch failure (generation {}): {}",
                            ticket.generation, err
                        );
                        return FetchOutcome::Stale;
                    }
                    state.last_error = Some(failure.clone());
                    state.summary = None;
                    state.loading = false;
                    state.initialized = true;
                }

                if err.is_unauthenticated() {
                    self.refresh_auth().await;
                }
                FetchOutcome::Failed(failure)
            }
        }
    }

    /// Files the current card under `label` and persists it in the
    /// background. Must run inside a Tokio runtime.
    pub fn classify(&self, label: Label) -> Option<Decision> {
        let decision = {
            let mut state = self.lock();
            state.user.as_ref()?;
            let decision = state.queue.advance(label)?;
            state.gesture.reset();
            decision
        };

        debug!("classified message {} as {}", decision.message.id, label);
        drop(self.dispatcher.persist(decision.clone()));
        Some(decision)
    }

    pub fn pointer_down(&self, pointer_id: PointerId, x: f64, target: PointerTarget) -> bool {
        let mut state = self.lock();
        if state.queue.head().is_none() {
            return false;
        }
        state.gesture.pointer_down(pointer_id, x, target)
    }

    pub fn pointer_move(&self, pointer_id: PointerId, x: f64) -> CardFeedback {
        let mut state = self.lock();
        state.gesture.pointer_move(pointer_id, x);
        state.gesture.feedback()
    }

    /// Releases the pointer; a committed swipe classifies the current card.
    pub fn pointer_up(&self, pointer_id: PointerId) -> GestureOutcome {
        let end = self.lock().gesture.pointer_up(pointer_id);
        let decision = end.committed().and_then(|label| self.classify(label));
        GestureOutcome { end, decision }
    }

    pub fn pointer_cancel(&self, pointer_id: PointerId) -> GestureEnd {
        self.lock().gesture.pointer_cancel(pointer_id)
    }

    pub fn card_feedback(&self) -> CardFeedback {
        self.lock().gesture.feedback()
    }

    pub fn head(&self) -> Option<Message> {
        self.lock().queue.head().cloned()
    }

    pub fn remaining(&self) -> usize {
        self.lock().queue.remaining()
    }

    pub fn filter(&self) -> Filter {
        self.lock().filter.clone()
    }

    pub fn list(&self, label: Label) -> Vec<Classification> {
        self.lock().queue.list(label).to_vec()
    }

    pub fn summary(&self) -> Option<FetchSummary> {
        self.lock().summary
    }

    pub fn last_error(&self) -> Option<FetchFailure> {
        self.lock().last_error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            user: state.user.clone(),
            filter: state.filter.clone(),
            head: state.queue.head().cloned(),
            remaining: state.queue.remaining(),
            good: state.queue.good().to_vec(),
            bad: state.queue.bad().to_vec(),
            summary: state.summary,
            loading: state.loading,
            error: state.last_error.as_ref().map(|e| e.message().to_string()),
            session_expired: state.last_error == Some(FetchFailure::SessionExpired),
            initialized: state.initialized,
            card: state.gesture.feedback(),
            in_flight: self.dispatcher.in_flight(),
        }
    }

    /// The thread of the current card, or the card alone when the thread
    /// is unavailable. `None` when caught up.
    pub async fn conversation(&self) -> Option<Conversation> {
        let (head, signed_in) = {
            let state = self.lock();
            (state.queue.head().cloned()?, state.user.is_some())
        };

        let thread = if signed_in && !head.thread_id.is_empty() {
            match self.service.fetch_thread(&head.thread_id).await {
                Ok(messages) => Some(messages),
                Err(err) => {
                    warn!("failed to load thread {}: {}", head.thread_id, err);
                    None
                }
            }
        } else {
            None
        };

        Some(Conversation::assemble(&head, thread))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::sync::Notify;

    use super::{FetchFailure, FetchOutcome, TriageSession, SESSION_EXPIRED_MESSAGE};
    use crate::auth::User;
    use crate::filters::RawFilter;
    use crate::gesture::{GestureEnd, PointerTarget};
    use crate::models::{Label, Message, StoredClassification};
    use crate::service::ServiceError;
    use crate::testing::{message, FakeService};

    fn head_id(session: &TriageSession) -> Option<String> {
        session.head().map(|m| m.id)
    }

    #[tokio::test]
    async fn sign_in_fetches_and_reconciles() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        service.push_batch(&["1", "2", "3"]);
        service.stored.lock().expect("stored lock").push(StoredClassification {
            id: Some("2".to_string()),
            label: Some("bad".to_string()),
            ..StoredClassification::default()
        });
        let session = TriageSession::new(service.clone());

        let user = session.sign_in().await.expect("sign in");
        assert_eq!(user.map(|u| u.email).as_deref(), Some("me@example.com"));

        let snapshot = session.snapshot();
        assert!(snapshot.initialized);
        assert!(!snapshot.loading);
        assert_eq!(snapshot.remaining, 2);
        assert_eq!(snapshot.after_head(), 1);
        assert_eq!(snapshot.bad.len(), 1);
        assert_eq!(snapshot.bad[0].subject, "Subject 2");
        assert_eq!(snapshot.summary.map(|s| s.delivered), Some(3));
    }

    #[tokio::test]
    async fn classify_advances_and_persists() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        service.push_batch(&["1", "2"]);
        let session = TriageSession::new(service.clone());
        session.sign_in().await.expect("sign in");

        let decision = session.classify(Label::Good).expect("classified");
        assert_eq!(decision.message.id, "1");
        assert_eq!(head_id(&session).as_deref(), Some("2"));
        assert_eq!(session.list(Label::Good).len(), 1);

        session.dispatcher().wait_idle().await;
        let posted = service.posted.lock().expect("posted lock");
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].label, Label::Good);
    }

    #[tokio::test]
    async fn classify_when_caught_up_does_nothing() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        let session = TriageSession::new(service.clone());
        session.sign_in().await.expect("sign in");

        assert!(session.classify(Label::Bad).is_none());
        assert!(session.list(Label::Bad).is_empty());
        session.dispatcher().wait_idle().await;
        assert!(service.posted.lock().expect("posted lock").is_empty());
    }

    #[tokio::test]
    async fn apply_filters_merges_overrides_and_reset_clears() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        let session = TriageSession::new(service.clone());
        session.sign_in().await.expect("sign in");

        session
            .apply_filters(RawFilter {
                max_results: Some("40".into()),
                search: Some("invoice".to_string()),
                ..RawFilter::default()
            })
            .await;
        session
            .apply_filters(RawFilter {
                since: Some("2024-05-10".to_string()),
                until: Some("2024-05-01".to_string()),
                ..RawFilter::default()
            })
            .await;

        let filter = session.filter();
        assert_eq!(filter.max_results, Some(40));
        assert_eq!(filter.search.as_deref(), Some("invoice"));
        assert!(filter.since < filter.until);

        session.reset_filters().await;
        assert!(session.filter().is_empty());
        let seen = service.filters_seen.lock().expect("filters lock");
        assert_eq!(seen.len(), 4);
        assert!(seen[3].is_empty());
    }

    #[tokio::test]
    async fn fetch_error_keeps_queue_and_clears_summary() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        service.push_batch(&["1", "2"]);
        service.push_error(ServiceError::Status {
            status: 500,
            message: "Gmail quota exceeded".to_string(),
        });
        let session = TriageSession::new(service.clone());
        session.sign_in().await.expect("sign in");

        let outcome = session.refresh().await;
        assert_eq!(
            outcome,
            FetchOutcome::Failed(FetchFailure::Fetch("Gmail quota exceeded".to_string()))
        );
        let snapshot = session.snapshot();
        assert_eq!(snapshot.remaining, 2);
        assert!(snapshot.summary.is_none());
        assert!(!snapshot.loading);
        assert_eq!(snapshot.error.as_deref(), Some("Gmail quota exceeded"));
    }

    #[tokio::test]
    async fn unauthenticated_fetch_reports_expiry_and_refreshes_auth() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        service.push_batch(&["1"]);
        service.push_error(ServiceError::Unauthenticated);
        let session = TriageSession::new(service.clone());
        session.sign_in().await.expect("sign in");

        *service.user.lock().expect("user lock") = None;
        let outcome = session.refresh().await;

        assert_eq!(outcome, FetchOutcome::Failed(FetchFailure::SessionExpired));
        assert_eq!(FetchFailure::SessionExpired.message(), SESSION_EXPIRED_MESSAGE);
        assert!(session.user().is_none());
        assert!(session.head().is_none());
        assert!(!session.is_initialized());
    }

    #[tokio::test]
    async fn unauthenticated_fetch_with_live_session_keeps_queue() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        service.push_batch(&["1"]);
        service.push_error(ServiceError::Unauthenticated);
        let session = TriageSession::new(service.clone());
        session.sign_in().await.expect("sign in");

        session.refresh().await;
        assert_eq!(head_id(&session).as_deref(), Some("1"));
        assert_eq!(session.last_error(), Some(FetchFailure::SessionExpired));
        assert!(session.snapshot().session_expired);
    }

    #[tokio::test]
    async fn result_arriving_after_user_switch_is_discarded() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(FakeService {
            user: Mutex::new(Some(User::new("a@example.com"))),
            gate: Some(gate.clone()),
            ..FakeService::default()
        });
        service.push_batch(&["a-1"]);
        let session = TriageSession::new(service.clone());
        session.set_user(Some(User::new("a@example.com")));

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.refresh().await }
        });
        tokio::task::yield_now().await;
        assert!(session.is_loading());

        session.set_user(Some(User::new("b@example.com")));
        gate.notify_one();

        let outcome = pending.await.expect("fetch task joins");
        assert_eq!(outcome, FetchOutcome::Stale);
        assert!(session.head().is_none());
        assert!(!session.is_initialized());
    }

    #[tokio::test]
    async fn older_fetch_resolving_last_does_not_overwrite_newer_one() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        let older_gate = service.push_gated_batch(&["old-1"]);
        let newer_gate = service.push_gated_batch(&["new-1", "new-2"]);
        let session = TriageSession::new(service.clone());
        session.set_user(Some(User::new("me@example.com")));

        let older = tokio::spawn({
            let session = session.clone();
            async move { session.refresh().await }
        });
        while service.filters_seen.lock().expect("filters lock").len() < 1 {
            tokio::task::yield_now().await;
        }

        let newer = tokio::spawn({
            let session = session.clone();
            async move { session.refresh().await }
        });
        while service.filters_seen.lock().expect("filters lock").len() < 2 {
            tokio::task::yield_now().await;
        }

        newer_gate.notify_one();
        let newer_outcome = newer.await.expect("newer fetch joins");
        assert!(matches!(newer_outcome, FetchOutcome::Applied(_)));
        assert_eq!(head_id(&session).as_deref(), Some("new-1"));

        older_gate.notify_one();
        let older_outcome = older.await.expect("older fetch joins");
        assert_eq!(older_outcome, FetchOutcome::Stale);
        assert_eq!(head_id(&session).as_deref(), Some("new-1"));
        assert_eq!(session.remaining(), 2);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn cancel_pending_discards_in_flight_result() {
        let gate = Arc::new(Notify::new());
        let service = Arc::new(FakeService {
            user: Mutex::new(Some(User::new("a@example.com"))),
            gate: Some(gate.clone()),
            ..FakeService::default()
        });
        service.push_batch(&["1"]);
        let session = TriageSession::new(service.clone());
        session.set_user(Some(User::new("a@example.com")));

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.refresh().await }
        });
        tokio::task::yield_now().await;
        session.cancel_pending();
        assert!(!session.is_loading());
        gate.notify_one();

        assert_eq!(pending.await.expect("fetch task joins"), FetchOutcome::Stale);
        assert!(session.head().is_none());
    }

    #[tokio::test]
    async fn fetch_without_user_is_a_no_op() {
        let service = Arc::new(FakeService::default());
        let session = TriageSession::new(service.clone());

        assert_eq!(session.refresh().await, FetchOutcome::SignedOut);
        assert!(service.filters_seen.lock().expect("filters lock").is_empty());
    }

    #[tokio::test]
    async fn committed_swipe_classifies_head() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        service.push_batch(&["1", "2"]);
        let session = TriageSession::new(service.clone());
        session.sign_in().await.expect("sign in");

        assert!(session.pointer_down(4, 0.0, PointerTarget::Card));
        session.pointer_move(4, 50.0);
        let feedback = session.pointer_move(4, 145.0);
        assert!(feedback.dragging);

        let outcome = session.pointer_up(4);
        assert_eq!(outcome.end, GestureEnd::Committed(Label::Good));
        assert_eq!(
            outcome.decision.map(|d| d.message.id).as_deref(),
            Some("1")
        );
        assert_eq!(head_id(&session).as_deref(), Some("2"));
        assert!(!session.card_feedback().dragging);
    }

    #[tokio::test]
    async fn pointer_down_without_card_is_ignored() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        let session = TriageSession::new(service);
        session.sign_in().await.expect("sign in");
        assert!(!session.pointer_down(1, 0.0, PointerTarget::Card));
    }

    #[tokio::test]
    async fn direct_classify_resets_drag_in_progress() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        service.push_batch(&["1", "2"]);
        let session = TriageSession::new(service);
        session.sign_in().await.expect("sign in");

        session.pointer_down(1, 0.0, PointerTarget::Card);
        session.pointer_move(1, 60.0);
        session.classify(Label::Bad);

        assert_eq!(session.card_feedback().offset, 0.0);
        assert_eq!(session.pointer_up(1).end, GestureEnd::Ignored);
    }

    #[tokio::test]
    async fn conversation_falls_back_to_head_when_thread_fails() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        service.push_batch(&["1"]);
        let session = TriageSession::new(service);
        session.sign_in().await.expect("sign in");

        let conversation = session.conversation().await.expect("has head");
        assert!(conversation.fallback);
        assert_eq!(conversation.messages[0].body, "snippet 1");
    }

    #[tokio::test]
    async fn conversation_uses_loaded_thread() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        service.push_batch(&["2"]);
        service.threads.lock().expect("threads lock").extend([
            Message {
                id: "1".to_string(),
                ..message("2")
            },
            message("2"),
        ]);
        let session = TriageSession::new(service);
        session.sign_in().await.expect("sign in");

        let conversation = session.conversation().await.expect("has head");
        assert!(!conversation.fallback);
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.thread_id, "t-2");
    }

    #[tokio::test]
    async fn sign_out_clears_everything() {
        let service = Arc::new(FakeService::signed_in("me@example.com"));
        service.push_batch(&["1"]);
        let session = TriageSession::new(service);
        session.sign_in().await.expect("sign in");

        session.sign_out().await;
        let snapshot = session.snapshot();
        assert!(snapshot.user.is_none());
        assert!(snapshot.head.is_none());
        assert!(snapshot.filter.is_empty());
        assert!(!snapshot.initialized);
    }
}
