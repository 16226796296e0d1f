use super::{Consumer, ConsumerReport};
use crate::error::{ConsumerError, InvalidPayloadMapping, ToneError};
use crate::order::OrderedBatch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

/// The opaque audio capability: play one tone, blocking until done.
pub trait ToneSink {
    fn play(&mut self, frequency_hz: f64, duration: Duration) -> Result<(), ToneError>;
}

/// Payload to frequency (Hz) mapping used by [`ToneConsumer`].
///
/// Serializes as a plain TOML table, so `[tone.frequencies]` in the config
/// file maps straight onto it. Payloads missing from the table are skipped by
/// the consumer rather than treated as errors.
///
/// # Example
///
/// ```rust
/// use qrseq::consumers::FrequencyTable;
///
/// let table = FrequencyTable::new([("A".to_string(), 440.0)]);
/// assert_eq!(table.get("A"), Some(440.0));
/// assert_eq!(table.get("B"), None);
/// assert_eq!(FrequencyTable::default().get("1"), Some(261.63));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FrequencyTable(BTreeMap<String, f64>);

impl FrequencyTable {
    pub fn new(entries: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self(entries.into_iter().collect())
    }

    pub fn get(&self, payload: &str) -> Option<f64> {
        self.0.get(payload).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Default for FrequencyTable {
    /// C major from middle C, keyed "1" through "6".
    fn default() -> Self {
        Self::new([
            ("1".to_string(), 261.63),
            ("2".to_string(), 293.66),
            ("3".to_string(), 329.63),
            ("4".to_string(), 349.23),
            ("5".to_string(), 392.00),
            ("6".to_string(), 440.00),
        ])
    }
}

/// Plays each mapped payload in batch order.
pub struct ToneConsumer<S: ToneSink> {
    sink: S,
    table: FrequencyTable,
    duration: Duration,
}

impl<S: ToneSink> ToneConsumer<S> {
    pub fn new(sink: S, table: FrequencyTable, duration: Duration) -> Self {
        Self {
            sink,
            table,
            duration,
        }
    }
}

impl<S: ToneSink> Consumer for ToneConsumer<S> {
    fn name(&self) -> &str {
        "tone"
    }

    fn consume(&mut self, batch: &OrderedBatch) -> Result<ConsumerReport, ConsumerError> {
        let mut report = ConsumerReport::default();
        for payload in &batch.payloads {
            let Some(frequency) = self.table.get(payload) else {
                debug!(payload = %payload, "no tone mapped");
                report.skipped.push(InvalidPayloadMapping::Unmapped {
                    payload: payload.clone(),
                });
                continue;
            };
            self.sink.play(frequency, self.duration)?;
            report.handled += 1;
        }
        info!(batch = batch.sequence, played = report.handled, "finished playing tones");
        Ok(report)
    }
}

/// Reports tones as text instead of synthesizing audio.
pub struct PrintedToneSink<W: Write> {
    out: W,
}

impl PrintedToneSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> PrintedToneSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ToneSink for PrintedToneSink<W> {
    fn play(&mut self, frequency_hz: f64, duration: Duration) -> Result<(), ToneError> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(ToneError::Unplayable { frequency_hz });
        }
        writeln!(
            self.out,
            "tone {:.2} Hz for {} ms",
            frequency_hz,
            duration.as_millis()
        )
        .map_err(|e| ToneError::Unavailable(e.to_string()))
    }
}
