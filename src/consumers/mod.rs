use crate::error::{ConsumerError, InvalidPayloadMapping};
use crate::order::OrderedBatch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod history;
pub mod log;
pub mod tone;
pub mod trigger;

pub use history::{HistoryConsumer, SessionHistory};
pub use log::{LogConsumer, LogFormat};
pub use tone::{FrequencyTable, PrintedToneSink, ToneConsumer, ToneSink};
pub use trigger::{NamedTracks, TriggerConsumer, TriggerTarget};

/// A downstream action that receives every dispatched batch.
pub trait Consumer {
    fn name(&self) -> &str;
    fn consume(&mut self, batch: &OrderedBatch) -> Result<ConsumerReport, ConsumerError>;
}

/// What one consumer did with one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerReport {
    pub handled: usize,
    pub skipped: Vec<InvalidPayloadMapping>,
}

impl ConsumerReport {
    pub fn handled(count: usize) -> Self {
        Self {
            handled: count,
            skipped: Vec::new(),
        }
    }
}

/// The consumers selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerKind {
    Log,
    Tone,
    Trigger,
    History,
}

impl ConsumerKind {
    pub const ALL: [ConsumerKind; 4] = [Self::Log, Self::Tone, Self::Trigger, Self::History];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Tone => "tone",
            Self::Trigger => "trigger",
            Self::History => "history",
        }
    }
}

impl std::str::FromStr for ConsumerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl std::fmt::Display for ConsumerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
