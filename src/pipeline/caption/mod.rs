pub mod model;
pub mod service;

pub use model::{CaptionModel, SidecarCaptioner};
pub use service::{BoxCaptionService, CaptionService, caption_service};
