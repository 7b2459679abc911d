use std::collections::{HashMap, HashSet};

use crate::models::{Classification, Label, Message, StoredClassification};

/// The partition of one fetch cycle: pending messages plus the good and bad
/// review lists. Every fetched id lands in exactly one of the three.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub queue: Vec<Message>,
    pub good: Vec<Classification>,
    pub bad: Vec<Classification>,
}

impl Reconciled {
    pub fn len(&self) -> usize {
        self.queue.len() + self.good.len() + self.bad.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Merges a fresh message batch with the stored classifications.
///
/// Stored entries without an id or with an unknown label are ignored. A
/// repeated id keeps its first position and takes the last stored value.
/// Classified messages are backfilled with the fresh non-empty display fields;
/// everything else is queued in fetch order.
pub fn reconcile(fetched: Vec<Message>, stored: Vec<StoredClassification>) -> Reconciled {
    let mut classified: Vec<Classification> = Vec::with_capacity(stored.len());
    let mut lookup: HashMap<String, usize> = HashMap::with_capacity(stored.len());

    for item in stored.into_iter().filter_map(StoredClassification::normalize) {
        match lookup.get(&item.id) {
            Some(&position) => classified[position] = item,
            None => {
                lookup.insert(item.id.clone(), classified.len());
                classified.push(item);
            }
        }
    }

    let mut queue = Vec::new();
    let mut queued: HashSet<String> = HashSet::new();

    for message in fetched {
        if let Some(&position) = lookup.get(&message.id) {
            classified[position].backfill_from(&message);
        } else if queued.insert(message.id.clone()) {
            queue.push(message);
        }
    }

    let (good, bad) = classified
        .into_iter()
        .partition(|item| item.label == Label::Good);

    Reconciled { queue, good, bad }
}
