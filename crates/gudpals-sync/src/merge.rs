use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

use uuid::Uuid;

use gudpals_types::models::{Message, SessionChat};

/// A record with a stable identity.
pub trait Record {
    type Id: Eq + Hash + Clone + Debug;

    fn record_id(&self) -> Self::Id;
}

impl Record for Message {
    type Id = Uuid;

    fn record_id(&self) -> Uuid {
        self.id
    }
}

impl Record for SessionChat {
    type Id = Uuid;

    fn record_id(&self) -> Uuid {
        self.id
    }
}

/// Client-held, arrival-ordered sequence with at most one entry per identity.
///
/// Pushes arrive after the initial load in server commit order, so appending
/// is enough; the sequence is never re-sorted.
#[derive(Debug)]
pub struct MergeStore<R: Record> {
    records: Vec<R>,
    seen: HashSet<R::Id>,
}

impl<R: Record> Default for MergeStore<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<R: Record> MergeStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole sequence. Repeated identities keep their first position.
    pub fn load_initial(&mut self, records: Vec<R>) {
        self.records.clear();
        self.seen.clear();
        for record in records {
            self.on_push(record);
        }
    }

    /// Append unless the identity is already present. Returns whether it was appended.
    pub fn on_push(&mut self, record: R) -> bool {
        if !self.seen.insert(record.record_id()) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Mutate one record in place. Identity must not change.
    pub fn update(&mut self, id: &R::Id, f: impl FnOnce(&mut R)) -> bool {
        match self.records.iter_mut().find(|r| r.record_id() == *id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    pub fn update_where(&mut self, pred: impl Fn(&R) -> bool, mut f: impl FnMut(&mut R)) -> usize {
        let mut n = 0;
        for record in self.records.iter_mut().filter(|r| pred(r)) {
            f(record);
            n += 1;
        }
        n
    }

    pub fn contains(&self, id: &R::Id) -> bool {
        self.seen.contains(id)
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
