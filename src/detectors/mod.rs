use crate::error::DecodeError;
use crate::frame::Frame;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use tracing::debug;

pub mod qr;
pub mod test_utils;

pub use qr::RqrrDecoder;

const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// The opaque barcode-recognition capability.
pub trait Decoder {
    fn name(&self) -> &'static str;
    fn decode(&self, image: &RgbImage) -> Result<Vec<RawCode>, DecodeError>;
}

/// What a decoder reports for one code: its text and bounding polygon
/// (empty, or at least three vertices).
#[derive(Debug, Clone, PartialEq)]
pub struct RawCode {
    pub payload: String,
    pub polygon: Vec<(i32, i32)>,
}

impl RawCode {
    pub fn new(payload: impl Into<String>, polygon: Vec<(i32, i32)>) -> Self {
        Self {
            payload: payload.into(),
            polygon,
        }
    }
}

/// One payload observed in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub payload: String,
    /// Leftmost x of the bounding polygon.
    pub position: f32,
    /// Only present for polygons with at least four vertices.
    pub outline: Option<Vec<(i32, i32)>>,
}

impl Detection {
    pub fn new(payload: impl Into<String>, position: f32) -> Self {
        Self {
            payload: payload.into(),
            position,
            outline: None,
        }
    }

    /// Normalize a decoder report. Returns `None` for empty payloads.
    pub fn from_raw(raw: RawCode) -> Option<Self> {
        if raw.payload.is_empty() {
            return None;
        }
        let position = raw
            .polygon
            .iter()
            .map(|&(x, _)| x)
            .min()
            .map_or(0.0, |x| x as f32);
        let outline = (raw.polygon.len() >= 4).then_some(raw.polygon);
        Some(Self {
            payload: raw.payload,
            position,
            outline,
        })
    }
}

/// Wraps a [`Decoder`] and turns its output into [`Detection`]s.
pub struct DetectorAdapter {
    decoder: Box<dyn Decoder>,
    annotate: bool,
}

impl DetectorAdapter {
    pub fn new<D: Decoder + 'static>(decoder: D) -> Self {
        Self {
            decoder: Box::new(decoder),
            annotate: false,
        }
    }

    /// Draw an outline around each detection on the frame.
    pub fn with_annotation(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    pub fn decoder_name(&self) -> &'static str {
        self.decoder.name()
    }

    pub fn detect(&self, frame: &mut Frame) -> Result<Vec<Detection>, DecodeError> {
        let detections: Vec<Detection> = self
            .decoder
            .decode(&frame.image)?
            .into_iter()
            .filter_map(Detection::from_raw)
            .collect();

        if !detections.is_empty() {
            debug!(
                frame = frame.index,
                count = detections.len(),
                payloads = ?detections.iter().map(|d| d.payload.as_str()).collect::<Vec<_>>(),
                "decoded codes"
            );
        }

        if self.annotate {
            for outline in detections.iter().filter_map(|d| d.outline.as_deref()) {
                draw_hull(&mut frame.image, outline);
                frame.annotated = true;
            }
        }

        Ok(detections)
    }
}

fn draw_hull(image: &mut RgbImage, polygon: &[(i32, i32)]) {
    let points: Vec<Point<i32>> = polygon.iter().map(|&(x, y)| Point::new(x, y)).collect();
    let hull = convex_hull(&points[..]);
    for (i, start) in hull.iter().enumerate() {
        let end = hull[(i + 1) % hull.len()];
        draw_line_segment_mut(
            image,
            (start.x as f32, start.y as f32),
            (end.x as f32, end.y as f32),
            OUTLINE_COLOR,
        );
    }
}
