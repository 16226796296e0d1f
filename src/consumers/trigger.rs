use super::{Consumer, ConsumerReport};
use crate::error::{ConsumerError, InvalidPayloadMapping, TriggerError};
use crate::order::OrderedBatch;
use std::io::Write;
use std::num::IntErrorKind;
use tracing::{info, warn};

/// The opaque external-session capability. Indexes are 1-based.
pub trait TriggerTarget {
    fn trigger(&mut self, index: i64) -> Result<(), TriggerError>;
}

/// Treats each payload as a 1-based track number and launches it.
pub struct TriggerConsumer<T: TriggerTarget> {
    target: T,
}

impl<T: TriggerTarget> TriggerConsumer<T> {
    pub fn new(target: T) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &T {
        &self.target
    }
}

impl<T: TriggerTarget> Consumer for TriggerConsumer<T> {
    fn name(&self) -> &str {
        "trigger"
    }

    fn consume(&mut self, batch: &OrderedBatch) -> Result<ConsumerReport, ConsumerError> {
        let mut report = ConsumerReport::default();
        for payload in &batch.payloads {
            let Some(index) = parse_index(payload) else {
                let skipped = InvalidPayloadMapping::NotAnIndex {
                    payload: payload.clone(),
                };
                warn!(batch = batch.sequence, "{}", skipped);
                report.skipped.push(skipped);
                continue;
            };
            match self.target.trigger(index) {
                Ok(()) => report.handled += 1,
                Err(TriggerError::Unavailable(reason)) => {
                    return Err(TriggerError::Unavailable(reason).into());
                }
                Err(reason) => {
                    let skipped = InvalidPayloadMapping::Rejected {
                        payload: payload.clone(),
                        reason,
                    };
                    warn!(batch = batch.sequence, "{}", skipped);
                    report.skipped.push(skipped);
                }
            }
        }
        Ok(report)
    }
}

/// Integers beyond `i64` saturate so the target reports them as out of range.
fn parse_index(payload: &str) -> Option<i64> {
    match payload.trim().parse::<i64>() {
        Ok(index) => Some(index),
        Err(err) => match err.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

/// A fixed list of named tracks that reports each launch as a line of text.
pub struct NamedTracks<W: Write> {
    names: Vec<String>,
    launched: Vec<usize>,
    out: W,
}

impl NamedTracks<std::io::Stdout> {
    pub fn stdout(names: Vec<String>) -> Self {
        Self::new(names, std::io::stdout())
    }
}

impl<W: Write> NamedTracks<W> {
    pub fn new(names: Vec<String>, out: W) -> Self {
        Self {
            names,
            launched: Vec::new(),
            out,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 1-based indexes launched so far, in order.
    pub fn launched(&self) -> &[usize] {
        &self.launched
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TriggerTarget for NamedTracks<W> {
    fn trigger(&mut self, index: i64) -> Result<(), TriggerError> {
        if self.names.is_empty() {
            return Err(TriggerError::Unavailable("no tracks configured".into()));
        }
        if index < 1 {
            return Err(TriggerError::InvalidIndex { index });
        }
        if index as u64 > self.names.len() as u64 {
            return Err(TriggerError::IndexOutOfRange {
                index,
                available: self.names.len(),
            });
        }
        let slot = index as usize;
        let name = &self.names[slot - 1];
        writeln!(self.out, "launched track {} ({})", slot, name)
            .map_err(|e| TriggerError::Unavailable(e.to_string()))?;
        info!(track = slot, name = %name, "launched track");
        self.launched.push(slot);
        Ok(())
    }
}
