pub mod acquisition;
pub mod caption;
pub mod controller;
pub mod narrator;
pub mod persistence;
pub mod stage;
pub mod types;

pub use acquisition::{FrameSource, ImageAcquirer};
pub use controller::{
    ControllerState, IterationOutcome, LoopTiming, PipelineController, PipelineControllerBuilder,
    RunSummary,
};
pub use narrator::Narrator;
pub use persistence::{OutputDirectory, PersistenceWriter};
pub use stage::{PipelineStage, StageResult, StageTimings};
pub use types::{CanonicalImage, Caption, IterationRecord, RawFrame};
