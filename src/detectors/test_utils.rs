//! Scripted stand-ins for the opaque capabilities, shared by unit and
//! integration tests.

use super::{Decoder, RawCode};
use crate::consumers::tone::ToneSink;
use crate::error::{DecodeError, FrameReadError, ToneError};
use crate::frame::{Frame, FrameSource};
use image::RgbImage;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Step {
    Codes(Vec<RawCode>),
    Fail,
}

/// Decoder that replays a fixed script keyed by call number. The n-th call to
/// `decode` is treated as frame n; unscripted frames decode to nothing.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecoder {
    script: HashMap<usize, Step>,
    calls: Cell<usize>,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_frame(mut self, frame: usize, codes: Vec<RawCode>) -> Self {
        self.script.insert(frame, Step::Codes(codes));
        self
    }

    pub fn fail_on(mut self, frame: usize) -> Self {
        self.script.insert(frame, Step::Fail);
        self
    }
}

impl Decoder for ScriptedDecoder {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn decode(&self, _image: &RgbImage) -> Result<Vec<RawCode>, DecodeError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        match self.script.get(&call) {
            Some(Step::Codes(codes)) => Ok(codes.clone()),
            Some(Step::Fail) => Err(DecodeError::Backend(format!(
                "scripted failure on frame {call}"
            ))),
            None => Ok(Vec::new()),
        }
    }
}

/// Build a decoder report for `payload` placed at horizontal position `x`
///
/// The polygon is a 10x10 square whose left edge sits at `x`, so the
/// resulting [`Detection`](super::Detection) has position `x`.
///
/// # Arguments
///
/// * `payload` - Decoded text of the code
/// * `x` - Leftmost x coordinate of the code
///
/// # Example
///
/// ```rust
/// use qrseq::detectors::Detection;
/// use qrseq::detectors::test_utils::code_at;
///
/// let detection = Detection::from_raw(code_at("4", 120)).unwrap();
/// assert_eq!(detection.position, 120.0);
/// ```
pub fn code_at(payload: &str, x: i32) -> RawCode {
    RawCode::new(payload, vec![(x, 0), (x + 10, 0), (x + 10, 10), (x, 10)])
}

/// Frame source producing blank frames at the given timestamps (in seconds),
/// optionally failing after the last one instead of reporting end of stream.
#[derive(Debug)]
pub struct TimedSource {
    times: Vec<f64>,
    next: usize,
    fail_at_end: bool,
    released: Rc<Cell<bool>>,
}

impl TimedSource {
    pub fn new(times: &[f64]) -> Self {
        Self {
            times: times.to_vec(),
            next: 0,
            fail_at_end: false,
            released: Rc::new(Cell::new(false)),
        }
    }

    pub fn failing_at_end(mut self) -> Self {
        self.fail_at_end = true;
        self
    }

    /// Handle that reports whether `release` has been called.
    pub fn released_flag(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.released)
    }
}

impl FrameSource for TimedSource {
    fn read(&mut self) -> Result<Option<Frame>, FrameReadError> {
        match self.times.get(self.next) {
            Some(&secs) => {
                let frame = Frame::new(
                    self.next as u64,
                    Duration::from_secs_f64(secs),
                    RgbImage::new(4, 4),
                );
                self.next += 1;
                Ok(Some(frame))
            }
            None if self.fail_at_end => Err(FrameReadError::Unavailable("camera unplugged".into())),
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        self.released.set(true);
    }
}

/// Tone sink that records what it was asked to play.
#[derive(Debug, Clone, Default)]
pub struct RecordingToneSink {
    played: Rc<RefCell<Vec<(f64, Duration)>>>,
    fail: bool,
}

impl RecordingToneSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose device is gone: every `play` fails.
    pub fn broken() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<(f64, Duration)> {
        self.played.borrow().clone()
    }
}

impl ToneSink for RecordingToneSink {
    fn play(&mut self, frequency_hz: f64, duration: Duration) -> Result<(), ToneError> {
        if self.fail {
            return Err(ToneError::Unavailable("no audio device".into()));
        }
        self.played.borrow_mut().push((frequency_hz, duration));
        Ok(())
    }
}
