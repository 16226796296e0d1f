use crate::window::Entry;
use serde::{Deserialize, Serialize};

/// Payloads of one flushed window, left to right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedBatch {
    pub sequence: u64,
    pub payloads: Vec<String>,
}

impl OrderedBatch {
    pub fn new(sequence: u64, payloads: Vec<String>) -> Self {
        Self { sequence, payloads }
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }
}

/// Sort entries by ascending position. The sort is stable, so entries at the
/// same position stay in first-seen order.
pub fn order(mut entries: Vec<Entry>, sequence: u64) -> OrderedBatch {
    entries.sort_by(|a, b| a.position.total_cmp(&b.position));
    OrderedBatch::new(sequence, entries.into_iter().map(|e| e.payload).collect())
}
