use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CameraSettings;
use crate::error::{CaptureError, RemoteError};
use crate::pipeline::acquisition::FrameSource;
use crate::pipeline::acquisition::strategy::{StrategyOutcome, SubscriptionStrategy, release};
use crate::pipeline::types::{CanonicalImage, RawFrame};
use crate::remote::{PHOTO_CAPTURE, PhotoCapture, Session, VIDEO_DEVICE, VideoDevice};

/// Pulls one image per call from the robot, degrading through the subscription
/// chain, then a one-shot photo, then a placeholder. Never fails.
pub struct ImageAcquirer {
    session: Arc<dyn Session>,
    camera: CameraSettings,
}

impl ImageAcquirer {
    pub fn new(session: Arc<dyn Session>, camera: CameraSettings) -> Self {
        Self { session, camera }
    }

    pub async fn acquire(&self) -> CanonicalImage {
        let error = match self.capture_via_subscription().await {
            Ok(image) => return image,
            Err(error) => error,
        };
        warn!("Camera capture failed: {}; trying photo capture", error);

        match self.capture_via_photo().await {
            Ok(image) => image,
            Err(error) => {
                warn!("Photo capture failed: {}; using placeholder image", error);
                CanonicalImage::placeholder()
            }
        }
    }

    /// Logs the camera indexes the service reports, if it can.
    pub async fn probe_cameras(&self) {
        let camera = match self.session.service(VIDEO_DEVICE).await {
            Ok(service) => VideoDevice::new(service),
            Err(e) => {
                warn!("Camera service unavailable: {}", e);
                return;
            }
        };
        match camera.get_camera_indexes().await {
            Ok(indexes) => info!("Available cameras: {:?}", indexes),
            Err(e) if e.is_unsupported() => debug!("Camera service does not list cameras"),
            Err(e) => warn!("Failed to list cameras: {}", e),
        }
    }

    async fn capture_via_subscription(&self) -> Result<CanonicalImage, CaptureError> {
        let camera = VideoDevice::new(self.session.service(VIDEO_DEVICE).await?);
        let (strategy, handle) = self.negotiate(&camera).await?;
        debug!("Subscribed to camera via {} strategy as {}", strategy.name(), handle);

        let result = self.pull_frame(&camera, &handle).await;
        release(&camera, &handle).await;
        result
    }

    async fn negotiate(
        &self,
        camera: &VideoDevice,
    ) -> Result<(SubscriptionStrategy, String), CaptureError> {
        let mut last_unsupported = None;
        for strategy in SubscriptionStrategy::CHAIN {
            match strategy.attempt(camera, &self.camera).await {
                StrategyOutcome::Subscribed(handle) => return Ok((strategy, handle)),
                StrategyOutcome::Unsupported(error) => {
                    debug!("{} strategy unsupported: {}", strategy.name(), error);
                    last_unsupported = Some(error);
                }
                StrategyOutcome::Failed(error) => return Err(CaptureError::Remote(error)),
            }
        }
        Err(CaptureError::NoSubscription(last_unsupported.unwrap_or_else(|| {
            RemoteError::Unsupported {
                service: VIDEO_DEVICE.to_string(),
                method: "subscribe".to_string(),
            }
        })))
    }

    async fn pull_frame(
        &self,
        camera: &VideoDevice,
        handle: &str,
    ) -> Result<CanonicalImage, CaptureError> {
        tokio::time::sleep(self.camera.settle()).await;

        let reply = camera.get_image_remote(handle).await?;
        let frame = RawFrame::try_from(&reply)?;
        info!(
            "Captured frame {}x{}, {} channels",
            frame.width, frame.height, frame.channels
        );
        CanonicalImage::from_raw(frame)
    }

    async fn capture_via_photo(&self) -> Result<CanonicalImage, CaptureError> {
        let photo = PhotoCapture::new(self.session.service(PHOTO_CAPTURE).await?);
        photo.set_resolution(self.camera.photo_resolution).await?;
        photo.set_picture_format(&self.camera.photo_format).await?;
        photo.take_picture(&self.camera.photo_path).await?;

        let path = PathBuf::from(&self.camera.photo_path);
        tokio::task::spawn_blocking(move || CanonicalImage::open(&path))
            .await
            .map_err(|e| CaptureError::Task(e.to_string()))?
    }
}

#[async_trait]
impl FrameSource for ImageAcquirer {
    async fn capture(&mut self) -> Result<CanonicalImage, CaptureError> {
        Ok(self.acquire().await)
    }
}
