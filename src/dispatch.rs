//! Fire-and-forget persistence of triage decisions.
//!
//! Every decision is sent exactly once. A failed call is logged and dropped:
//! the local queue has already moved on and the remote store catches up on
//! the next fetch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::db::Database;
use crate::models::Decision;
use crate::service::MailService;

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Holds one in-flight slot; released on drop, including when the task
/// panics.
struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn acquire(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(in_flight))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    service: Arc<dyn MailService>,
    outbox: Option<Arc<Mutex<Database>>>,
    in_flight: Arc<InFlight>,
    failures: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(service: Arc<dyn MailService>) -> Self {
        Self {
            service,
            outbox: None,
            in_flight: Arc::default(),
            failures: Arc::default(),
        }
    }

    pub fn with_outbox(mut self, outbox: Arc<Mutex<Database>>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn outbox(&self) -> Option<&Arc<Mutex<Database>>> {
        self.outbox.as_ref()
    }

    /// Number of persistence calls that have not resolved yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Persistence calls rejected since this dispatcher was created.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Spawns the persistence call for `decision` on the current runtime.
    pub fn persist(&self, decision: Decision) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let outbox = self.outbox.clone();
        let failures = Arc::clone(&self.failures);
        let entry_id = outbox
            .as_deref()
            .and_then(|db| record_dispatch(db, &decision));

        let guard = InFlightGuard::acquire(&self.in_flight);
        tokio::spawn(async move {
            let _guard = guard;
            match service.create_classification(&decision).await {
                Ok(()) => {
                    debug!(
                        "persisted {} classification for message {}",
                        decision.label, decision.message.id
                    );
                    if let (Some(db), Some(entry_id)) = (outbox.as_deref(), entry_id.as_deref()) {
                        finish(db, entry_id, None);
                    }
                }
                Err(err) => {
                    failures.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        "failed to persist {} classification for message {}: {}",
                        decision.label, decision.message.id, err
                    );
                    if let (Some(db), Some(entry_id)) = (outbox.as_deref(), entry_id.as_deref()) {
                        finish(db, entry_id, Some(&err.to_string()));
                    }
                }
            }
        })
    }

    /// Waits until every spawned persistence call has resolved.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

fn record_dispatch(db: &Mutex<Database>, decision: &Decision) -> Option<String> {
    let db = db.lock().unwrap_or_else(PoisonError::into_inner);
    match db.record_dispatch(decision) {
        Ok(entry_id) => Some(entry_id),
        Err(err) => {
            warn!(
                "failed to record outbox entry for message {}: {}",
                decision.message.id, err
            );
            None
        }
    }
}

fn finish(db: &Mutex<Database>, entry_id: &str, error: Option<&str>) {
    let db = db.lock().unwrap_or_else(PoisonError::into_inner);
    let result = match error {
        None => db.mark_persisted(entry_id),
        Some(error) => db.mark_failed(entry_id, error),
    };
    if let Err(err) = result {
        warn!("failed to update outbox entry {entry_id}: {err}");
    }
}
