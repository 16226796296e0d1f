use crate::consumers::{Consumer, ConsumerReport};
use crate::error::ConsumerFailure;
use crate::order::OrderedBatch;
use tracing::{info, warn};

/// Result of handing one batch to every consumer.
#[derive(Debug, Default, PartialEq)]
pub struct DispatchReport {
    /// Per consumer that succeeded, in registration order.
    pub delivered: Vec<(String, ConsumerReport)>,
    pub failures: Vec<ConsumerFailure>,
}

impl DispatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Hands each ordered batch to the registered consumers, in registration
/// order. One consumer failing never keeps the others from running.
pub struct BatchDispatcher {
    consumers: Vec<Box<dyn Consumer>>,
}

impl BatchDispatcher {
    pub fn new() -> Self {
        Self {
            consumers: Vec::new(),
        }
    }

    pub fn register<C: Consumer + 'static>(mut self, consumer: C) -> Self {
        self.consumers.push(Box::new(consumer));
        self
    }

    pub fn register_boxed(mut self, consumer: Box<dyn Consumer>) -> Self {
        self.consumers.push(consumer);
        self
    }

    pub fn consumer_names(&self) -> Vec<&str> {
        self.consumers.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Hand `batch` to every consumer in registration order.
    ///
    /// A consumer error is logged and recorded as a [`ConsumerFailure`]; the
    /// remaining consumers still receive the batch.
    pub fn dispatch(&mut self, batch: &OrderedBatch) -> DispatchReport {
        info!(
            batch = batch.sequence,
            payloads = ?batch.payloads,
            "dispatching batch"
        );

        let mut report = DispatchReport::default();
        for consumer in self.consumers.iter_mut() {
            match consumer.consume(batch) {
                Ok(outcome) => {
                    report.delivered.push((consumer.name().to_string(), outcome));
                }
                Err(error) => {
                    let failure = ConsumerFailure {
                        consumer: consumer.name().to_string(),
                        sequence: batch.sequence,
                        error,
                    };
                    warn!("{}", failure);
                    report.failures.push(failure);
                }
            }
        }
        report
    }
}

impl Default for BatchDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
