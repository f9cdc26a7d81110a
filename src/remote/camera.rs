use crate::error::RemoteError;
use crate::remote::{ServiceHandle, Value};

/// Typed view over the camera service.
#[derive(Clone)]
pub struct VideoDevice {
    service: ServiceHandle,
}

impl VideoDevice {
    pub fn new(service: ServiceHandle) -> Self {
        Self { service }
    }

    pub async fn subscribe_camera(
        &self,
        client: &str,
        camera_index: i64,
        resolution: i64,
        color_space: i64,
        fps: i64,
    ) -> Result<String, RemoteError> {
        let reply = self
            .service
            .call(
                "subscribeCamera",
                vec![
                    client.into(),
                    camera_index.into(),
                    resolution.into(),
                    color_space.into(),
                    fps.into(),
                ],
            )
            .await?;
        self.subscription_handle("subscribeCamera", reply)
    }

    pub async fn subscribe(
        &self,
        client: &str,
        resolution: i64,
        color_space: i64,
        fps: i64,
    ) -> Result<String, RemoteError> {
        let reply = self
            .service
            .call(
                "subscribe",
                vec![
                    client.into(),
                    resolution.into(),
                    color_space.into(),
                    fps.into(),
                ],
            )
            .await?;
        self.subscription_handle("subscribe", reply)
    }

    pub async fn set_active_camera(&self, camera_index: i64) -> Result<(), RemoteError> {
        self.service
            .call("setActiveCamera", vec![camera_index.into()])
            .await
            .map(drop)
    }

    pub async fn set_resolution(&self, handle: &str, resolution: i64) -> Result<(), RemoteError> {
        self.service
            .call("setResolution", vec![handle.into(), resolution.into()])
            .await
            .map(drop)
    }

    pub async fn set_color_space(&self, handle: &str, color_space: i64) -> Result<(), RemoteError> {
        self.service
            .call("setColorSpace", vec![handle.into(), color_space.into()])
            .await
            .map(drop)
    }

    pub async fn set_frame_rate(&self, handle: &str, fps: i64) -> Result<(), RemoteError> {
        self.service
            .call("setFrameRate", vec![handle.into(), fps.into()])
            .await
            .map(drop)
    }

    /// Raw reply of `getImageRemote`; may be null when no frame is ready.
    pub async fn get_image_remote(&self, handle: &str) -> Result<Value, RemoteError> {
        self.service.call("getImageRemote", vec![handle.into()]).await
    }

    pub async fn unsubscribe(&self, handle: &str) -> Result<(), RemoteError> {
        self.service
            .call("unsubscribe", vec![handle.into()])
            .await
            .map(drop)
    }

    pub async fn get_camera_indexes(&self) -> Result<Vec<i64>, RemoteError> {
        let reply = self.service.call("getCameraIndexes", vec![]).await?;
        Ok(reply
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_int)
            .collect())
    }

    fn subscription_handle(&self, method: &str, reply: Value) -> Result<String, RemoteError> {
        match reply {
            Value::Str(handle) => Ok(handle),
            other => Err(RemoteError::Protocol(format!(
                "{}.{} returned {:?} instead of a subscription handle",
                self.service.name(),
                method,
                other
            ))),
        }
    }
}

/// Typed view over the one-shot photo service.
#[derive(Clone)]
pub struct PhotoCapture {
    service: ServiceHandle,
}

impl PhotoCapture {
    pub fn new(service: ServiceHandle) -> Self {
        Self { service }
    }

    pub async fn set_resolution(&self, resolution: i64) -> Result<(), RemoteError> {
        self.service
            .call("setResolution", vec![resolution.into()])
            .await
            .map(drop)
    }

    pub async fn set_picture_format(&self, format: &str) -> Result<(), RemoteError> {
        self.service
            .call("setPictureFormat", vec![format.into()])
            .await
            .map(drop)
    }

    pub async fn take_picture(&self, path: &str) -> Result<(), RemoteError> {
        self.service
            .call("takePicture", vec![path.into()])
            .await
            .map(drop)
    }
}
