pub mod app;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod remote;

pub use error::{AppError, CaptionError, CaptureError, RemoteError};
