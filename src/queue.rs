use std::collections::VecDeque;

use crate::models::{Classification, Decision, Label, Message};
use crate::reconcile::Reconciled;

/// Pending messages plus the per-session good and bad lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriageQueue {
    pending: VecDeque<Message>,
    good: Vec<Classification>,
    bad: Vec<Classification>,
}

impl TriageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_reconciled(reconciled: Reconciled) -> Self {
        Self {
            pending: reconciled.queue.into(),
            good: reconciled.good,
            bad: reconciled.bad,
        }
    }

    /// Replaces all three collections with a freshly reconciled batch.
    pub fn replace(&mut self, reconciled: Reconciled) {
        *self = Self::from_reconciled(reconciled);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn head(&self) -> Option<&Message> {
        self.pending.front()
    }

    /// Pops the head and files it under `label`. Returns the decision to
    /// persist, or `None` when there is nothing left to triage.
    pub fn advance(&mut self, label: Label) -> Option<Decision> {
        let decision = Decision::new(self.pending.pop_front()?, label);
        let classification = decision.classification();
        match label {
            Label::Good => self.good.push(classification),
            Label::Bad => self.bad.push(classification),
        }
        Some(decision)
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn is_caught_up(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Message> {
        self.pending.iter()
    }

    pub fn good(&self) -> &[Classification] {
        &self.good
    }

    pub fn bad(&self) -> &[Classification] {
        &self.bad
    }

    pub fn list(&self, label: Label) -> &[Classification] {
        match label {
            Label::Good => &self.good,
            Label::Bad => &self.bad,
        }
    }
}
