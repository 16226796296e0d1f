use super::{Decoder, RawCode};
use crate::error::DecodeError;
use image::RgbImage;
use rqrr::PreparedImage;
use tracing::debug;

/// QR decoder backed by `rqrr`.
#[derive(Debug, Clone, Default)]
pub struct RqrrDecoder;

impl RqrrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for RqrrDecoder {
    fn name(&self) -> &'static str {
        "rqrr"
    }

    fn decode(&self, image: &RgbImage) -> Result<Vec<RawCode>, DecodeError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::EmptyFrame { width, height });
        }

        let grey = image::DynamicImage::ImageRgb8(image.clone()).to_luma8();
        let mut prepared = PreparedImage::prepare_from_greyscale(
            width as usize,
            height as usize,
            |x, y| grey.get_pixel(x as u32, y as u32).0[0],
        );

        let mut codes = Vec::new();
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_, content)) => {
                    let polygon = grid.bounds.iter().map(|p| (p.x, p.y)).collect();
                    codes.push(RawCode::new(content, polygon));
                }
                Err(err) => debug!(error = %err, "skipping undecodable grid"),
            }
        }
        Ok(codes)
    }
}
