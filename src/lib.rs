pub mod config;
pub mod consumers;
pub mod detectors;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod frame;
pub mod order;
pub mod window;

pub use config::SequencerConfig;
pub use dispatch::BatchDispatcher;
pub use engine::{EngineSettings, ExitReason, RunSummary, SequencerEngine};
pub use order::OrderedBatch;
pub use window::{DedupPolicy, WindowScheduler, WindowState};
