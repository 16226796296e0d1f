use std::path::PathBuf;
use thiserror::Error;

/// The frame source could not produce the next frame. Ends the capture loop.
#[derive(Debug, Error)]
pub enum FrameReadError {
    #[error("failed to open frame {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
}

/// The decoding capability failed on a whole frame. Non-fatal.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DecodeError {
    #[error("empty frame ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("decoder failure: {0}")]
    Backend(String),
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ToneError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),
    #[error("cannot play {frequency_hz} Hz")]
    Unplayable { frequency_hz: f64 },
}

/// Outcome of asking the external trigger capability to act on an index.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TriggerError {
    #[error("index {index} out of range (1..={available})")]
    IndexOutOfRange { index: i64, available: usize },
    #[error("invalid index {index}")]
    InvalidIndex { index: i64 },
    #[error("trigger target unavailable: {0}")]
    Unavailable(String),
}

/// A payload that one consumer could not map and skipped.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum InvalidPayloadMapping {
    #[error("no frequency mapped for payload {payload:?}")]
    Unmapped { payload: String },
    #[error("payload {payload:?} is not a track index")]
    NotAnIndex { payload: String },
    #[error("payload {payload:?} rejected: {reason}")]
    Rejected {
        payload: String,
        reason: TriggerError,
    },
}

impl InvalidPayloadMapping {
    pub fn payload(&self) -> &str {
        match self {
            Self::Unmapped { payload }
            | Self::NotAnIndex { payload }
            | Self::Rejected { payload, .. } => payload,
        }
    }
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConsumerError {
    #[error(transparent)]
    Tone(#[from] ToneError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error("write failed: {0}")]
    Write(String),
}

impl From<std::io::Error> for ConsumerError {
    fn from(err: std::io::Error) -> Self {
        Self::Write(err.to_string())
    }
}

/// A consumer failed on one batch; the other consumers still ran.
#[derive(Debug, Error, PartialEq, Clone)]
#[error("consumer {consumer} failed on batch {sequence}: {error}")]
pub struct ConsumerFailure {
    pub consumer: String,
    pub sequence: u64,
    #[source]
    pub error: ConsumerError,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
    #[error("unknown consumer: {0}")]
    UnknownConsumer(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
