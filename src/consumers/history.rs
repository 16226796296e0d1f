use super::{Consumer, ConsumerReport};
use crate::error::ConsumerError;
use crate::order::OrderedBatch;
use std::cell::RefCell;
use std::rc::Rc;

/// Session-long record of dispatched batches, owned by the caller. Clones
/// share the same record.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    batches: Rc<RefCell<Vec<OrderedBatch>>>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, batch: OrderedBatch) {
        self.batches.borrow_mut().push(batch);
    }

    pub fn batches(&self) -> Vec<OrderedBatch> {
        self.batches.borrow().clone()
    }

    /// Payload sequences only, one per batch.
    pub fn sequences(&self) -> Vec<Vec<String>> {
        self.batches
            .borrow()
            .iter()
            .map(|b| b.payloads.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.batches.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.borrow().is_empty()
    }
}

pub struct HistoryConsumer {
    history: SessionHistory,
}

impl HistoryConsumer {
    pub fn new(history: SessionHistory) -> Self {
        Self { history }
    }
}

impl Consumer for HistoryConsumer {
    fn name(&self) -> &str {
        "history"
    }

    fn consume(&mut self, batch: &OrderedBatch) -> Result<ConsumerReport, ConsumerError> {
        self.history.push(batch.clone());
        Ok(ConsumerReport::handled(batch.len()))
    }
}
