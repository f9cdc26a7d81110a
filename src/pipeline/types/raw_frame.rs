use bytes::Bytes;

use crate::error::CaptureError;
use crate::remote::Value;

/// Fields a camera reply must carry: width, height, channels, color space,
/// two timestamp words and the pixel buffer.
const MIN_FIELD_COUNT: usize = 7;
const PIXELS_FIELD: usize = 6;

/// Pixel payload exactly as the camera service returned it.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub pixels: Bytes,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, channels: u32, pixels: Bytes) -> Self {
        Self {
            width,
            height,
            channels,
            pixels,
        }
    }

    /// `None` when the dimensions cannot describe an addressable buffer.
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.channels as usize)
    }
}

impl TryFrom<&Value> for RawFrame {
    type Error = CaptureError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        if value.is_null() {
            return Err(CaptureError::InvalidFrame("camera returned no frame".to_string()));
        }
        let fields = value
            .as_list()
            .ok_or_else(|| CaptureError::InvalidFrame(format!("expected a field list, got {value:?}")))?;
        if fields.len() < MIN_FIELD_COUNT {
            return Err(CaptureError::InvalidFrame(format!(
                "frame has {} fields, expected at least {}",
                fields.len(),
                MIN_FIELD_COUNT
            )));
        }

        let dimension = |index: usize, label: &str| -> Result<u32, CaptureError> {
            fields[index]
                .as_int()
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .ok_or_else(|| {
                    CaptureError::InvalidFrame(format!("{label} is not a positive integer"))
                })
        };
        let width = dimension(0, "width")?;
        let height = dimension(1, "height")?;
        let channels = dimension(2, "channel count")?;
        let pixels = fields[PIXELS_FIELD]
            .as_bytes()
            .cloned()
            .ok_or_else(|| CaptureError::InvalidFrame("pixel buffer is missing".to_string()))?;

        let frame = Self::new(width, height, channels, pixels);
        if frame.expected_len().is_none() {
            return Err(CaptureError::InvalidFrame(format!(
                "{width}x{height}x{channels} frame does not fit in memory"
            )));
        }
        Ok(frame)
    }
}
