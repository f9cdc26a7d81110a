use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Future;
use futures::task::{Context, Poll};
use tower::timeout::TimeoutLayer;
use tower::util::BoxService;
use tower::{Service, ServiceBuilder};

use crate::pipeline::caption::CaptionModel;
use crate::pipeline::types::CanonicalImage;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type BoxCaptionService = BoxService<CanonicalImage, String, BoxError>;

#[derive(Clone)]
pub struct CaptionService {
    inner: Arc<dyn CaptionModel>,
}

impl CaptionService {
    pub fn new(inner: Arc<dyn CaptionModel>) -> Self {
        Self { inner }
    }
}

impl Service<CanonicalImage> for CaptionService {
    type Response = String;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, image: CanonicalImage) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.infer(&image).await?) })
    }
}

/// Wraps the model in the caption stack, bounding each inference when a
/// timeout is given.
pub fn caption_service(model: Arc<dyn CaptionModel>, timeout: Option<Duration>) -> BoxCaptionService {
    let service = ServiceBuilder::new()
        .option_layer(timeout.map(TimeoutLayer::new))
        .service(CaptionService::new(model));
    BoxService::new(service)
}
