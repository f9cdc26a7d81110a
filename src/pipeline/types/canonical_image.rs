use image::{DynamicImage, GrayImage, ImageBuffer, Rgb, RgbImage, RgbaImage};
use std::path::Path;
use std::sync::Arc;

use crate::error::CaptureError;
use crate::pipeline::types::RawFrame;

pub const PLACEHOLDER_WIDTH: u32 = 640;
pub const PLACEHOLDER_HEIGHT: u32 = 480;
pub const PLACEHOLDER_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// Decoded 3-channel raster for one iteration. Clones share the pixel buffer.
#[derive(Debug, Clone)]
pub struct CanonicalImage {
    image: Arc<RgbImage>,
    synthetic: bool,
}

impl CanonicalImage {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
            synthetic: false,
        }
    }

    /// Stand-in used when every acquisition path failed.
    pub fn placeholder() -> Self {
        Self {
            image: Arc::new(ImageBuffer::from_pixel(
                PLACEHOLDER_WIDTH,
                PLACEHOLDER_HEIGHT,
                PLACEHOLDER_COLOR,
            )),
            synthetic: true,
        }
    }

    /// Reshapes a flat height x width x channels buffer into RGB.
    pub fn from_raw(frame: RawFrame) -> Result<Self, CaptureError> {
        let expected = frame.expected_len().ok_or_else(|| {
            CaptureError::InvalidFrame(format!(
                "{}x{}x{} frame does not fit in memory",
                frame.width, frame.height, frame.channels
            ))
        })?;
        if frame.pixels.len() != expected {
            return Err(CaptureError::BufferSize {
                expected,
                actual: frame.pixels.len(),
            });
        }

        let buffer = frame.pixels.to_vec();
        let size_error = || CaptureError::BufferSize {
            expected,
            actual: expected,
        };
        let image = match frame.channels {
            3 => RgbImage::from_raw(frame.width, frame.height, buffer).ok_or_else(size_error)?,
            1 => DynamicImage::ImageLuma8(
                GrayImage::from_raw(frame.width, frame.height, buffer).ok_or_else(size_error)?,
            )
            .to_rgb8(),
            4 => DynamicImage::ImageRgba8(
                RgbaImage::from_raw(frame.width, frame.height, buffer).ok_or_else(size_error)?,
            )
            .to_rgb8(),
            other => return Err(CaptureError::UnsupportedChannels(other)),
        };
        Ok(Self::new(image))
    }

    /// Decodes an image file of any supported format into RGB.
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        Ok(Self::new(image::open(path)?.to_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u8 {
        3
    }

    pub fn is_placeholder(&self) -> bool {
        self.synthetic
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }
}
