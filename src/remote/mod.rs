pub mod camera;
pub mod framed;
pub mod session;
pub mod speech;
pub mod value;
pub mod wire;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::RemoteError;

pub use camera::{PhotoCapture, VideoDevice};
pub use session::TcpSession;
pub use speech::TextToSpeech;
pub use value::Value;

pub const VIDEO_DEVICE: &str = "ALVideoDevice";
pub const PHOTO_CAPTURE: &str = "ALPhotoCapture";
pub const TEXT_TO_SPEECH: &str = "ALTextToSpeech";

/// A named service exposed by the robot. Which methods exist depends on the
/// firmware, so callers learn it per call from `RemoteError::Unsupported`.
#[async_trait]
pub trait RemoteService: Send + Sync {
    fn name(&self) -> &str;
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RemoteError>;
}

pub type ServiceHandle = Arc<dyn RemoteService>;

/// A live connection to the robot, shared read-only by every stage for the whole run.
#[async_trait]
pub trait Session: Send + Sync {
    async fn service(&self, name: &str) -> Result<ServiceHandle, RemoteError>;
}
