use crate::config::CameraSettings;
use crate::error::RemoteError;
use crate::remote::VideoDevice;

/// Subscription methods, from most capable to most widely supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStrategy {
    /// `subscribeCamera` with camera index, resolution, color space and fps.
    Managed,
    /// `subscribe` without a camera index.
    Simple,
    /// Configure the fixed client id field by field, no subscription call.
    Imperative,
}

impl SubscriptionStrategy {
    pub const CHAIN: [SubscriptionStrategy; 3] = [
        SubscriptionStrategy::Managed,
        SubscriptionStrategy::Simple,
        SubscriptionStrategy::Imperative,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SubscriptionStrategy::Managed => "managed",
            SubscriptionStrategy::Simple => "simple",
            SubscriptionStrategy::Imperative => "imperative",
        }
    }

    pub async fn attempt(self, camera: &VideoDevice, params: &CameraSettings) -> StrategyOutcome {
        match self {
            SubscriptionStrategy::Managed => camera
                .subscribe_camera(
                    &params.client_name,
                    params.camera_index,
                    params.resolution,
                    params.color_space,
                    params.fps,
                )
                .await
                .into(),
            SubscriptionStrategy::Simple => camera
                .subscribe(
                    &params.client_name,
                    params.resolution,
                    params.color_space,
                    params.fps,
                )
                .await
                .into(),
            SubscriptionStrategy::Imperative => {
                let client = params.client_name.as_str();
                let configured = async {
                    camera.set_active_camera(params.camera_index).await?;
                    camera.set_resolution(client, params.resolution).await?;
                    camera.set_color_space(client, params.color_space).await?;
                    camera.set_frame_rate(client, params.fps).await
                }
                .await;
                if configured.is_err() {
                    // Part of the configuration may have been applied to the client id.
                    release(camera, client).await;
                }
                configured.map(|()| client.to_string()).into()
            }
        }
    }
}

/// Result of one strategy, classified for capability negotiation.
#[derive(Debug)]
pub enum StrategyOutcome {
    Subscribed(String),
    /// The firmware lacks this method; the next strategy may still work.
    Unsupported(RemoteError),
    /// The method exists but failed; falling through would not help.
    Failed(RemoteError),
}

impl From<Result<String, RemoteError>> for StrategyOutcome {
    fn from(result: Result<String, RemoteError>) -> Self {
        match result {
            Ok(handle) => StrategyOutcome::Subscribed(handle),
            Err(error) if error.is_unsupported() => StrategyOutcome::Unsupported(error),
            Err(error) => StrategyOutcome::Failed(error),
        }
    }
}

/// Best-effort unsubscribe; the service's subscription bookkeeping is not ours to fix.
pub(crate) async fn release(camera: &VideoDevice, handle: &str) {
    let _ = camera.unsubscribe(handle).await;
}
