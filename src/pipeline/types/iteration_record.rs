use chrono::{DateTime, Local};
use std::path::PathBuf;
use uuid::Uuid;

use crate::pipeline::stage::{PipelineStage, StageTimings};
use crate::pipeline::types::{CanonicalImage, Caption};

/// Everything one loop body produced. Dropped once the iteration ends.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub id: Uuid,
    pub sequence: u64,
    pub started_at: DateTime<Local>,
    pub image: CanonicalImage,
    pub caption: Caption,
    /// `None` when persistence failed.
    pub output_path: Option<PathBuf>,
    pub degraded: Vec<PipelineStage>,
    pub timings: StageTimings,
}

impl IterationRecord {
    pub fn is_clean(&self) -> bool {
        self.degraded.is_empty()
    }
}
