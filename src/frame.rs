use crate::error::{FrameReadError, SinkError};
use image::RgbImage;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// One captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    /// Time since the source was opened. The engine treats this as "now".
    pub captured_at: Duration,
    pub image: RgbImage,
    /// Set when the detector drew outlines onto `image`.
    pub annotated: bool,
}

impl Frame {
    pub fn new(index: u64, captured_at: Duration, image: RgbImage) -> Self {
        Self {
            index,
            captured_at,
            image,
            annotated: false,
        }
    }
}

/// A lazy, possibly infinite sequence of frames.
pub trait FrameSource {
    /// `Ok(None)` signals end of stream.
    fn read(&mut self) -> Result<Option<Frame>, FrameReadError>;

    /// Release the underlying capture resource. Called exactly once by
    /// [`CaptureGuard`].
    fn release(&mut self) {}
}

/// Owns a frame source for the duration of a run and releases it on drop.
pub struct CaptureGuard<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: FrameSource + ?Sized> CaptureGuard<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        Self { source }
    }
}

impl<S: FrameSource + ?Sized> Deref for CaptureGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.source
    }
}

impl<S: FrameSource + ?Sized> DerefMut for CaptureGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.source
    }
}

impl<S: FrameSource + ?Sized> Drop for CaptureGuard<'_, S> {
    fn drop(&mut self) {
        self.source.release();
    }
}

/// How an [`ImageSequenceSource`] stamps its frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// `captured_at = index / fps`, no waiting.
    Virtual { fps: f64 },
    /// Sleep to hold `fps` and stamp with wall-clock time.
    Realtime { fps: f64 },
}

impl Pacing {
    pub fn fps(&self) -> f64 {
        match self {
            Self::Virtual { fps } | Self::Realtime { fps } => *fps,
        }
    }

    /// Whether the rate is positive and its frame interval fits in a
    /// [`Duration`].
    pub fn is_usable(&self) -> bool {
        self.fps() > 0.0 && self.frame_due(1).is_some()
    }

    /// Offset of frame `index` from the start of the stream, or `None` when it
    /// cannot be represented.
    pub fn frame_due(&self, index: u64) -> Option<Duration> {
        let fps = self.fps();
        if !(fps.is_finite() && fps > 0.0) {
            return None;
        }
        let interval = Duration::try_from_secs_f64(1.0 / fps).ok()?;
        interval.checked_mul(u32::try_from(index).ok()?)
    }
}

/// Replays image files as a video stream.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
    pacing: Pacing,
    opened_at: Instant,
    released: bool,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

impl ImageSequenceSource {
    pub fn new(paths: Vec<PathBuf>, pacing: Pacing) -> Self {
        Self {
            paths,
            next: 0,
            pacing,
            opened_at: Instant::now(),
            released: false,
        }
    }

    /// Expand directories into their image files, sorted by name. Plain file
    /// arguments are kept in the order given.
    pub fn from_inputs(inputs: &[PathBuf], pacing: Pacing) -> std::io::Result<Self> {
        let mut paths = Vec::new();
        for input in inputs {
            if input.is_dir() {
                let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| p.is_file() && is_image_path(p))
                    .collect();
                found.sort();
                paths.extend(found);
            } else {
                paths.push(input.clone());
            }
        }
        Ok(Self::new(paths, pacing))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

impl FrameSource for ImageSequenceSource {
    fn read(&mut self) -> Result<Option<Frame>, FrameReadError> {
        if self.released {
            return Err(FrameReadError::Unavailable("source released".into()));
        }
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        let index = self.next as u64;
        let due = self.pacing.frame_due(index).ok_or_else(|| {
            FrameReadError::Unavailable(format!(
                "frame {index} has no timestamp at {} fps",
                self.pacing.fps()
            ))
        })?;
        let captured_at = match self.pacing {
            Pacing::Virtual { .. } => due,
            Pacing::Realtime { .. } => {
                let elapsed = self.opened_at.elapsed();
                if due > elapsed {
                    std::thread::sleep(due - elapsed);
                }
                self.opened_at.elapsed()
            }
        };
        let image = image::open(path)
            .map_err(|source| FrameReadError::Open {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        debug!(frame = index, path = %path.display(), "read frame");
        self.next += 1;
        Ok(Some(Frame::new(index, captured_at, image)))
    }

    fn release(&mut self) {
        self.released = true;
    }
}

/// Receives frames after detection, e.g. for display.
pub trait FrameSink {
    fn show(&mut self, frame: &Frame) -> Result<(), SinkError>;
}

/// Writes frames that carry drawn outlines to a directory as PNG files.
pub struct AnnotatedFrameWriter {
    dir: PathBuf,
}

impl AnnotatedFrameWriter {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

impl FrameSink for AnnotatedFrameWriter {
    fn show(&mut self, frame: &Frame) -> Result<(), SinkError> {
        if !frame.annotated {
            return Ok(());
        }
        let path = self.dir.join(format!("frame_{:06}.png", frame.index));
        frame
            .image
            .save(&path)
            .map_err(|source| SinkError::Write { path, source })
    }
}
