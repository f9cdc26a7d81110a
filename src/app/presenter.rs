use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::info;

use crate::error::PresenterError;
use crate::pipeline::types::{CanonicalImage, Caption};

/// A single on-screen view, replaced in place every iteration.
#[async_trait]
pub trait Presenter: Send {
    async fn render(
        &mut self,
        image: &CanonicalImage,
        caption: &Caption,
        iteration: u64,
    ) -> Result<(), PresenterError>;

    /// Tears the view down. Called once, at shutdown.
    async fn close(&mut self);
}

pub fn frame_title(iteration: u64, at: DateTime<Local>) -> String {
    format!("Robot Camera - Iteration {} - {}", iteration, at.format("%H:%M:%S"))
}

pub fn caption_line(caption: &Caption) -> String {
    format!("Caption: {}", caption)
}

/// Presenter for runs without a display; each render is a log line.
#[derive(Debug, Default)]
pub struct HeadlessPresenter {
    closed: bool,
}

impl HeadlessPresenter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Presenter for HeadlessPresenter {
    async fn render(
        &mut self,
        image: &CanonicalImage,
        caption: &Caption,
        iteration: u64,
    ) -> Result<(), PresenterError> {
        if self.closed {
            return Err(PresenterError::Closed);
        }
        info!(
            "{} ({}x{}) {}",
            frame_title(iteration, Local::now()),
            image.width(),
            image.height(),
            caption_line(caption)
        );
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
