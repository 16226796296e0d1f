use crate::detectors::DetectorAdapter;
use crate::dispatch::BatchDispatcher;
use crate::frame::{CaptureGuard, FrameSink, FrameSource};
use crate::order::order;
use crate::window::{DedupPolicy, FlushDecision, WindowScheduler, WindowState};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Polled once per loop iteration.
pub trait StopSignal {
    fn should_stop(&mut self) -> bool;
}

/// Never asks the loop to stop; the stream has to end on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl StopSignal for Never {
    fn should_stop(&mut self) -> bool {
        false
    }
}

/// Stop flag that another thread (e.g. a key watcher) may raise.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl StopSignal for StopFlag {
    fn should_stop(&mut self) -> bool {
        self.is_raised()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub window_duration: Duration,
    pub emit_empty_batches: bool,
    pub dedup_policy: DedupPolicy,
    pub flush_on_exit: bool,
    pub max_frames: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            window_duration: Duration::from_millis(500),
            emit_empty_batches: false,
            dedup_policy: DedupPolicy::FirstSeen,
            flush_on_exit: true,
            max_frames: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Stopped,
    EndOfStream,
    FrameLimit,
    ReadFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub batches: u64,
    pub decode_errors: u64,
    pub consumer_failures: u64,
    pub exit: ExitReason,
}

/// The capture loop: detect, record, flush when the window expires, dispatch.
pub struct SequencerEngine {
    adapter: DetectorAdapter,
    dispatcher: BatchDispatcher,
    scheduler: WindowScheduler,
    settings: EngineSettings,
    sink: Option<Box<dyn FrameSink>>,
}

impl SequencerEngine {
    pub fn new(
        adapter: DetectorAdapter,
        dispatcher: BatchDispatcher,
        settings: EngineSettings,
    ) -> Self {
        let scheduler = WindowScheduler::new(settings.window_duration, settings.emit_empty_batches);
        Self {
            adapter,
            dispatcher,
            scheduler,
            settings,
            sink: None,
        }
    }

    pub fn with_sink<K: FrameSink + 'static>(mut self, sink: K) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Drive the capture loop until the stream ends, `stop` asks to stop, the
    /// frame limit is reached, or a frame cannot be read.
    ///
    /// Each frame is decoded and folded into the open window. When the window
    /// has run for `window_duration` (by frame timestamps) its payloads are
    /// ordered left to right and dispatched. Decode errors and consumer
    /// failures are counted and logged but never end the run. With
    /// `flush_on_exit`, a non-empty window is dispatched once more on the way
    /// out. The source is released on every exit path.
    ///
    /// # Arguments
    ///
    /// * `source` - Where frames come from
    /// * `stop` - Polled once per frame
    ///
    /// # Returns
    ///
    /// A [`RunSummary`] with counts and the reason the loop ended
    ///
    /// # Example
    ///
    /// ```rust
    /// use qrseq::consumers::{HistoryConsumer, SessionHistory};
    /// use qrseq::detectors::DetectorAdapter;
    /// use qrseq::detectors::test_utils::{ScriptedDecoder, TimedSource, code_at};
    /// use qrseq::engine::Never;
    /// use qrseq::{BatchDispatcher, EngineSettings, ExitReason, SequencerEngine};
    ///
    /// let decoder = ScriptedDecoder::new().on_frame(0, vec![code_at("2", 80), code_at("1", 5)]);
    /// let history = SessionHistory::new();
    /// let dispatcher = BatchDispatcher::new().register(HistoryConsumer::new(history.clone()));
    /// let mut engine = SequencerEngine::new(
    ///     DetectorAdapter::new(decoder),
    ///     dispatcher,
    ///     EngineSettings::default(),
    /// );
    ///
    /// let summary = engine.run(&mut TimedSource::new(&[0.0, 0.1]), &mut Never);
    /// assert_eq!(summary.exit, ExitReason::EndOfStream);
    /// assert_eq!(history.sequences(), vec![vec!["1".to_string(), "2".to_string()]]);
    /// ```
    pub fn run<S, T>(&mut self, source: &mut S, stop: &mut T) -> RunSummary
    where
        S: FrameSource + ?Sized,
        T: StopSignal + ?Sized,
    {
        let mut capture = CaptureGuard::new(source);
        let mut state = WindowState::new();
        let mut summary = RunSummary {
            frames: 0,
            batches: 0,
            decode_errors: 0,
            consumer_failures: 0,
            exit: ExitReason::EndOfStream,
        };
        let mut now = Duration::ZERO;

        info!(
            decoder = self.adapter.decoder_name(),
            window_ms = self.scheduler.duration().as_millis() as u64,
            consumers = ?self.dispatcher.consumer_names(),
            "starting capture loop"
        );

        loop {
            let mut frame = match capture.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("end of stream");
                    summary.exit = ExitReason::EndOfStream;
                    break;
                }
                Err(err) => {
                    error!(error = %err, "frame read failed; shutting down");
                    summary.exit = ExitReason::ReadFailure(err.to_string());
                    break;
                }
            };
            summary.frames += 1;
            now = frame.captured_at;

            let detections = match self.adapter.detect(&mut frame) {
                Ok(detections) => detections,
                Err(err) => {
                    warn!(frame = frame.index, error = %err, "decode failed");
                    summary.decode_errors += 1;
                    Vec::new()
                }
            };
            state.record(&detections, self.settings.dedup_policy);

            if let Some(sink) = self.sink.as_mut()
                && let Err(err) = sink.show(&frame)
            {
                warn!(frame = frame.index, error = %err, "frame sink failed");
            }

            match self.scheduler.flush_decision(&state, now) {
                FlushDecision::Wait => {}
                FlushDecision::Skip => {
                    state.reset(now);
                }
                FlushDecision::Dispatch => self.flush(&mut state, now, &mut summary),
            }

            if stop.should_stop() {
                info!(frames = summary.frames, "stop requested");
                summary.exit = ExitReason::Stopped;
                break;
            }
            if self
                .settings
                .max_frames
                .is_some_and(|limit| summary.frames >= limit)
            {
                summary.exit = ExitReason::FrameLimit;
                break;
            }
        }

        if self.settings.flush_on_exit && !state.is_empty() {
            self.flush(&mut state, now, &mut summary);
        }

        info!(
            frames = summary.frames,
            batches = summary.batches,
            "capture loop finished"
        );
        summary
    }

    // The next window opens at the flushing frame's timestamp. Time spent in
    // consumers is not on the frame clock, so a blocking consumer shortens the
    // next window under realtime pacing.
    fn flush(&mut self, state: &mut WindowState, now: Duration, summary: &mut RunSummary) {
        summary.batches += 1;
        let batch = order(state.reset(now), summary.batches);
        let report = self.dispatcher.dispatch(&batch);
        summary.consumer_failures += report.failures.len() as u64;
    }
}
