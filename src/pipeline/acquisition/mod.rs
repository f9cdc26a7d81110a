pub mod acquirer;
pub mod strategy;

use async_trait::async_trait;

use crate::error::CaptureError;
use crate::pipeline::types::CanonicalImage;

pub use acquirer::ImageAcquirer;
pub use strategy::{StrategyOutcome, SubscriptionStrategy};

/// Where the capture stage gets its image from.
#[async_trait]
pub trait FrameSource: Send {
    async fn capture(&mut self) -> Result<CanonicalImage, CaptureError>;
}
