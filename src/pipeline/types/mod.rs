mod canonical_image;
mod caption;
mod iteration_record;
mod raw_frame;

pub use canonical_image::{CanonicalImage, PLACEHOLDER_COLOR, PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH};
pub use caption::{CAPTION_FAILURE_SENTINEL, Caption};
pub use iteration_record::IterationRecord;
pub use raw_frame::RawFrame;
