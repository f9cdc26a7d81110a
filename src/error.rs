use thiserror::Error;

// Main Application Error Type. Only setup failures surface as this; per-iteration
// failures are contained by the pipeline controller.

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Remote Error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Caption Model Error: {0}")]
    Caption(#[from] CaptionError),
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("UI Error: {0}")]
    Ui(String),
    #[error("Pipeline Error: {0}")]
    Pipeline(String),
}

// Remote session / service error type
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("{service}.{method} is not supported by the remote service")]
    Unsupported { service: String, method: String },
    #[error("{service}.{method} failed: {message}")]
    Failed {
        service: String,
        method: String,
        message: String,
    },
    #[error("Remote service {0} is not available")]
    NoSuchService(String),
    #[error("Connection I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol violation: {0}")]
    Protocol(String),
    #[error("Handshake rejected: {0}")]
    Handshake(String),
    #[error("Connection closed by the remote end")]
    Disconnected,
    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

impl RemoteError {
    /// True when the remote end told us the method does not exist on this firmware.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, RemoteError::Unsupported { .. })
    }
}

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Invalid frame length: {0}")]
    InvalidFrameLength(usize),
    #[error("Invalid frame tag: {0}")]
    InvalidFrameTag(u8),
    #[error("Invalid value tag: {0}")]
    InvalidValueTag(u8),
    #[error("Invalid fault kind: {0}")]
    InvalidFaultKind(u8),
    #[error("Truncated payload, needed {needed} more bytes")]
    Truncated { needed: usize },
    #[error("String is not valid UTF-8")]
    InvalidUtf8,
    #[error("Value nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

impl From<WireError> for RemoteError {
    fn from(error: WireError) -> Self {
        RemoteError::Protocol(error.to_string())
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Remote Error: {0}")]
    Remote(#[from] RemoteError),
    #[error("No subscription strategy is supported by the camera service: {0}")]
    NoSubscription(RemoteError),
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u32),
    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Background task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("Failed to launch caption model: {0}")]
    Spawn(std::io::Error),
    #[error("Caption model I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Caption model sent an unreadable reply: {0}")]
    Protocol(String),
    #[error("Caption model reported an error: {0}")]
    Model(String),
    #[error("Caption model did not become ready: {0}")]
    NotReady(String),
    #[error("Failed to stage frame for the caption model: {0}")]
    Stage(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Writer task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum PresenterError {
    #[error("Display surface has been closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unsupported_errors_are_classified_as_unsupported() {
        let unsupported = RemoteError::Unsupported {
            service: "ALVideoDevice".to_string(),
            method: "subscribeCamera".to_string(),
        };
        assert!(unsupported.is_unsupported());

        let failed = RemoteError::Failed {
            service: "ALVideoDevice".to_string(),
            method: "subscribeCamera".to_string(),
            message: "camera busy".to_string(),
        };
        assert!(!failed.is_unsupported());
        assert!(!RemoteError::Disconnected.is_unsupported());
    }

    #[test]
    fn wire_errors_become_protocol_errors() {
        let error: RemoteError = WireError::InvalidFrameTag(9).into();
        assert!(matches!(error, RemoteError::Protocol(_)));
    }
}
