use chrono::Local;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::Presenter;
use crate::config::PipelineSettings;
use crate::error::AppError;
use crate::pipeline::acquisition::FrameSource;
use crate::pipeline::caption::BoxCaptionService;
use crate::pipeline::narrator::Narrator;
use crate::pipeline::persistence::{OutputDirectory, PersistenceWriter};
use crate::pipeline::stage::{PipelineStage, StageResult, StageTimings};
use crate::pipeline::types::{CanonicalImage, Caption, IterationRecord};

/// Fixed delays between iterations. No backoff, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    pub interval: Duration,
    pub capture_retry: Duration,
}

impl LoopTiming {
    pub fn delay_after(&self, outcome: &IterationOutcome) -> Duration {
        match outcome {
            IterationOutcome::Completed(_) => self.interval,
            IterationOutcome::CaptureFailed => self.capture_retry,
        }
    }
}

impl From<&PipelineSettings> for LoopTiming {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.interval_ms),
            capture_retry: Duration::from_millis(settings.capture_retry_ms),
        }
    }
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Running,
    Stopped,
}

#[derive(Debug)]
pub enum IterationOutcome {
    Completed(IterationRecord),
    /// No image; every later stage was skipped.
    CaptureFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub output_dir: PathBuf,
}

/// Owns the capture, caption, persist, display and narrate cycle.
///
/// Every stage after capture is isolated: its failure is logged and replaced
/// by a stand-in value, and the iteration carries on.
pub struct PipelineController {
    source: Box<dyn FrameSource>,
    caption: BoxCaptionService,
    writer: PersistenceWriter,
    output: OutputDirectory,
    presenter: Box<dyn Presenter>,
    narrator: Narrator,
    timing: LoopTiming,
    next_iteration: u64,
    state: ControllerState,
}

impl PipelineController {
    pub fn builder() -> PipelineControllerBuilder {
        PipelineControllerBuilder::new()
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Number of iterations that reached their end.
    pub fn iterations(&self) -> u64 {
        self.next_iteration - 1
    }

    /// Runs until `cancel` fires, then tears the display down.
    pub async fn run(&mut self, cancel: CancellationToken) -> RunSummary {
        info!(
            "Starting capture loop, artifacts go to {}",
            self.output.path().display()
        );
        while !cancel.is_cancelled() {
            let outcome = self.run_once().await;
            let delay = self.timing.delay_after(&outcome);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("Interrupt received, stopping");
        self.shutdown().await
    }

    pub async fn run_once(&mut self) -> IterationOutcome {
        let sequence = self.next_iteration;
        let started_at = Local::now();
        let mut timings = StageTimings::new();
        info!(iteration = sequence, "--- Iteration {} ---", sequence);

        let outcome = match self.capture(sequence, &mut timings).await.into_value() {
            Some(image) => {
                let record = self.process(sequence, started_at, image, &mut timings).await;
                if record.is_clean() {
                    debug!(iteration = sequence, record = %record.id, "iteration complete");
                } else {
                    warn!(
                        iteration = sequence,
                        record = %record.id,
                        "iteration degraded in {:?}",
                        record.degraded
                    );
                }
                IterationOutcome::Completed(record)
            }
            None => IterationOutcome::CaptureFailed,
        };

        debug!(iteration = sequence, "stage timings: {}", timings);
        self.next_iteration += 1;
        outcome
    }

    pub async fn shutdown(&mut self) -> RunSummary {
        if self.state == ControllerState::Running {
            self.presenter.close().await;
            self.state = ControllerState::Stopped;
        }
        let summary = RunSummary {
            iterations: self.iterations(),
            output_dir: self.output.path().to_path_buf(),
        };
        info!(
            "Stopped after {} iterations, images saved in {}",
            summary.iterations,
            summary.output_dir.display()
        );
        summary
    }

    async fn capture(
        &mut self,
        sequence: u64,
        timings: &mut StageTimings,
    ) -> StageResult<CanonicalImage> {
        let start = Instant::now();
        let result = self.source.capture().await;
        timings.record(PipelineStage::Capture, start.elapsed());

        match result {
            Ok(image) => {
                info!(
                    iteration = sequence,
                    stage = %PipelineStage::Capture,
                    "captured {}x{}{}",
                    image.width(),
                    image.height(),
                    if image.is_placeholder() { " (placeholder)" } else { "" }
                );
                StageResult::Continue(image)
            }
            Err(e) => {
                error!(
                    iteration = sequence,
                    stage = %PipelineStage::Capture,
                    "stage failed, skipping the rest of the iteration: {}",
                    e
                );
                StageResult::Abort
            }
        }
    }

    async fn process(
        &mut self,
        sequence: u64,
        started_at: chrono::DateTime<Local>,
        image: CanonicalImage,
        timings: &mut StageTimings,
    ) -> IterationRecord {
        let mut degraded = Vec::new();

        let start = Instant::now();
        let inferred = match self.caption.ready().await {
            Ok(service) => service.call(image.clone()).await,
            Err(e) => Err(e),
        };
        let caption = Self::settle(
            PipelineStage::Caption,
            sequence,
            inferred.map(Caption::Generated),
            Caption::Failed,
            &mut degraded,
        );
        timings.record(PipelineStage::Caption, start.elapsed());
        info!(iteration = sequence, stage = %PipelineStage::Caption, "caption: '{}'", caption);

        let start = Instant::now();
        let persisted = self
            .writer
            .persist(&image, &caption, &self.output, sequence, started_at)
            .await
            .map(Some);
        let output_path = Self::settle(
            PipelineStage::Persist,
            sequence,
            persisted,
            None,
            &mut degraded,
        );
        timings.record(PipelineStage::Persist, start.elapsed());
        if let Some(path) = &output_path {
            info!(iteration = sequence, stage = %PipelineStage::Persist, "saved {}", path.display());
        }

        let start = Instant::now();
        let rendered = self.presenter.render(&image, &caption, sequence).await;
        if rendered.is_ok() {
            info!(iteration = sequence, stage = %PipelineStage::Display, "view updated");
        }
        Self::settle(PipelineStage::Display, sequence, rendered, (), &mut degraded);
        timings.record(PipelineStage::Display, start.elapsed());

        let start = Instant::now();
        let narrated = self.narrator.narrate(caption.as_str()).await;
        if narrated.is_ok() {
            info!(iteration = sequence, stage = %PipelineStage::Narrate, "caption spoken");
        }
        Self::settle(PipelineStage::Narrate, sequence, narrated, (), &mut degraded);
        timings.record(PipelineStage::Narrate, start.elapsed());

        IterationRecord {
            id: Uuid::new_v4(),
            sequence,
            started_at,
            image,
            caption,
            output_path,
            degraded,
            timings: timings.clone(),
        }
    }

    fn settle<T: Clone, E: std::fmt::Display>(
        stage: PipelineStage,
        sequence: u64,
        result: Result<T, E>,
        fallback: T,
        degraded: &mut Vec<PipelineStage>,
    ) -> T {
        let outcome = StageResult::from_result(stage, sequence, result, fallback.clone());
        if outcome.is_degraded() {
            degraded.push(stage);
        }
        outcome.into_value().unwrap_or(fallback)
    }
}

pub struct PipelineControllerBuilder {
    source: Option<Box<dyn FrameSource>>,
    caption: Option<BoxCaptionService>,
    writer: Option<PersistenceWriter>,
    output: Option<OutputDirectory>,
    presenter: Option<Box<dyn Presenter>>,
    narrator: Option<Narrator>,
    timing: LoopTiming,
}

impl Default for PipelineControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineControllerBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            caption: None,
            writer: None,
            output: None,
            presenter: None,
            narrator: None,
            timing: LoopTiming::default(),
        }
    }

    pub fn source(mut self, source: impl FrameSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn caption_service(mut self, caption: BoxCaptionService) -> Self {
        self.caption = Some(caption);
        self
    }

    pub fn writer(mut self, writer: PersistenceWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn output_directory(mut self, output: OutputDirectory) -> Self {
        self.output = Some(output);
        self
    }

    pub fn presenter(mut self, presenter: impl Presenter + 'static) -> Self {
        self.presenter = Some(Box::new(presenter));
        self
    }

    pub fn narrator(mut self, narrator: Narrator) -> Self {
        self.narrator = Some(narrator);
        self
    }

    // Overrides the delays taken from the default pipeline settings.
    pub fn timing(mut self, timing: LoopTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn build(self) -> Result<PipelineController, AppError> {
        let missing = |part: &str| AppError::Pipeline(format!("{} is required", part));
        Ok(PipelineController {
            source: self.source.ok_or_else(|| missing("frame source"))?,
            caption: self.caption.ok_or_else(|| missing("caption service"))?,
            writer: self.writer.ok_or_else(|| missing("persistence writer"))?,
            output: self.output.ok_or_else(|| missing("output directory"))?,
            presenter: self.presenter.ok_or_else(|| missing("presenter"))?,
            narrator: self.narrator.ok_or_else(|| missing("narrator"))?,
            timing: self.timing,
            next_iteration: 1,
            state: ControllerState::Running,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraSettings, OutputSettings, SpeechSettings};
    use crate::error::{CaptionError, CaptureError, PresenterError};
    use crate::pipeline::acquisition::ImageAcquirer;
    use crate::pipeline::caption::{CaptionModel, caption_service};
    use crate::pipeline::types::CAPTION_FAILURE_SENTINEL;
    use crate::remote::mock::{Reply, ScriptedService, ScriptedSession, frame_reply, handle_reply};
    use crate::remote::{TEXT_TO_SPEECH, VIDEO_DEVICE, Value};
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::{Arc, Mutex};

    /// Frame source replaying a script; cancels `stop_after` captures in.
    struct ScriptedSource {
        script: VecDeque<Result<CanonicalImage, CaptureError>>,
        captured_at: Arc<Mutex<Vec<tokio::time::Instant>>>,
        stop: Option<(usize, CancellationToken)>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<CanonicalImage, CaptureError>>) -> Self {
            Self {
                script: script.into(),
                captured_at: Arc::new(Mutex::new(Vec::new())),
                stop: None,
            }
        }

        fn cancel_after(mut self, captures: usize, cancel: CancellationToken) -> Self {
            self.stop = Some((captures, cancel));
            self
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn capture(&mut self) -> Result<CanonicalImage, CaptureError> {
            let count = {
                let mut captured_at = self.captured_at.lock().unwrap();
                captured_at.push(tokio::time::Instant::now());
                captured_at.len()
            };
            if let Some((after, cancel)) = &self.stop {
                if count >= *after {
                    cancel.cancel();
                }
            }
            self.script.pop_front().unwrap_or_else(|| Ok(frame()))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingPresenter {
        rendered: Arc<Mutex<Vec<(u64, String)>>>,
        closed: Arc<Mutex<bool>>,
        fail: bool,
    }

    #[async_trait]
    impl Presenter for RecordingPresenter {
        async fn render(
            &mut self,
            _image: &CanonicalImage,
            caption: &Caption,
            iteration: u64,
        ) -> Result<(), PresenterError> {
            self.rendered
                .lock()
                .unwrap()
                .push((iteration, caption.to_string()));
            if self.fail {
                return Err(PresenterError::Closed);
            }
            Ok(())
        }

        async fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    struct FixedModel(&'static str);

    #[async_trait]
    impl CaptionModel for FixedModel {
        async fn infer(&self, _image: &CanonicalImage) -> Result<String, CaptionError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl CaptionModel for FailingModel {
        async fn infer(&self, _image: &CanonicalImage) -> Result<String, CaptionError> {
            Err(CaptionError::Model("tensor shape mismatch".to_string()))
        }
    }

    /// Captions real frames, chokes on the synthetic placeholder.
    struct PickyModel;

    #[async_trait]
    impl CaptionModel for PickyModel {
        async fn infer(&self, image: &CanonicalImage) -> Result<String, CaptionError> {
            if image.is_placeholder() {
                Err(CaptionError::Model("no objects found".to_string()))
            } else {
                Ok("a person waving".to_string())
            }
        }
    }

    fn frame() -> CanonicalImage {
        CanonicalImage::new(RgbImage::from_pixel(16, 12, Rgb([40, 90, 160])))
    }

    fn speech() -> Arc<ScriptedService> {
        ScriptedService::new(TEXT_TO_SPEECH)
            .on("setLanguage", Reply::ok())
            .on("setVolume", Reply::ok())
            .on("say", Reply::ok())
    }

    struct Harness {
        _root: tempfile::TempDir,
        output: OutputDirectory,
        presenter: RecordingPresenter,
    }

    impl Harness {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let output = OutputDirectory::create(root.path(), "robot_captures", Local::now()).unwrap();
            Self {
                _root: root,
                output,
                presenter: RecordingPresenter::default(),
            }
        }

        fn controller(
            &self,
            source: impl FrameSource + 'static,
            model: impl CaptionModel + 'static,
            session: ScriptedSession,
        ) -> PipelineController {
            PipelineController::builder()
                .source(source)
                .caption_service(caption_service(Arc::new(model), None))
                .writer(PersistenceWriter::new(&OutputSettings::default()))
                .output_directory(self.output.clone())
                .presenter(self.presenter.clone())
                .narrator(Narrator::new(Arc::new(session), &SpeechSettings::default()))
                .timing(LoopTiming {
                    interval: Duration::from_secs(10),
                    capture_retry: Duration::from_secs(3),
                })
                .build()
                .unwrap()
        }

        fn files(&self, extension: &str) -> Vec<PathBuf> {
            let mut files: Vec<PathBuf> = fs::read_dir(self.output.path())
                .unwrap()
                .map(|e| e.unwrap().path())
                .filter(|p| p.extension().is_some_and(|e| e == extension))
                .collect();
            files.sort();
            files
        }
    }

    fn completed(outcome: IterationOutcome) -> IterationRecord {
        match outcome {
            IterationOutcome::Completed(record) => record,
            IterationOutcome::CaptureFailed => panic!("capture unexpectedly failed"),
        }
    }

    #[tokio::test]
    async fn caption_failure_feeds_the_sentinel_to_later_stages() {
        let harness = Harness::new();
        let tts = speech();
        let mut controller = harness.controller(
            ScriptedSource::new(vec![Ok(frame())]),
            FailingModel,
            ScriptedSession::new().with(tts.clone()),
        );

        let record = completed(controller.run_once().await);

        assert!(record.caption.is_failed());
        assert!(!record.is_clean());
        assert_eq!(record.degraded, vec![PipelineStage::Caption]);
        assert!(record.timings.get(PipelineStage::Narrate).is_some());
        let text = fs::read_to_string(record.output_path.unwrap().with_extension("txt")).unwrap();
        assert!(text.ends_with(&format!("Caption: {}\n", CAPTION_FAILURE_SENTINEL)));
        assert_eq!(
            *harness.presenter.rendered.lock().unwrap(),
            vec![(1, CAPTION_FAILURE_SENTINEL.to_string())]
        );
        assert_eq!(
            tts.args_of("say"),
            vec![vec![Value::Str(CAPTION_FAILURE_SENTINEL.to_string())]]
        );
    }

    #[tokio::test]
    async fn display_and_narration_failures_do_not_stop_the_iteration() {
        let mut harness = Harness::new();
        harness.presenter.fail = true;
        let tts = ScriptedService::new(TEXT_TO_SPEECH)
            .on("setVolume", Reply::ok())
            .on("say", Reply::fail("speaker unplugged"));
        let mut controller = harness.controller(
            ScriptedSource::new(vec![Ok(frame()), Ok(frame())]),
            FixedModel("a desk lamp"),
            ScriptedSession::new().with(tts.clone()),
        );

        let first = completed(controller.run_once().await);
        let second = completed(controller.run_once().await);

        assert_eq!(first.degraded, vec![PipelineStage::Display, PipelineStage::Narrate]);
        assert_ne!(first.id, second.id);
        assert!(first.output_path.is_some());
        assert_eq!(second.sequence, 2);
        assert_eq!(tts.calls_to("say"), 2);
        assert_eq!(harness.files("jpg").len(), 2);
    }

    #[tokio::test]
    async fn capture_failure_skips_every_later_stage() {
        let harness = Harness::new();
        let tts = speech();
        let mut controller = harness.controller(
            ScriptedSource::new(vec![Err(CaptureError::Task("camera thread panicked".to_string()))]),
            FixedModel("unused"),
            ScriptedSession::new().with(tts.clone()),
        );

        let outcome = controller.run_once().await;

        assert!(matches!(outcome, IterationOutcome::CaptureFailed));
        assert_eq!(controller.iterations(), 1);
        assert!(harness.files("jpg").is_empty());
        assert!(harness.presenter.rendered.lock().unwrap().is_empty());
        assert!(tts.methods_called().is_empty());

        let record = completed(controller.run_once().await);
        assert_eq!(record.sequence, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_failure_waits_the_retry_delay_not_the_interval() {
        let harness = Harness::new();
        let cancel = CancellationToken::new();
        let source = ScriptedSource::new(vec![
            Err(CaptureError::Task("camera thread panicked".to_string())),
            Ok(frame()),
        ])
        .cancel_after(3, cancel.clone());
        let captured_at = source.captured_at.clone();
        let mut controller =
            harness.controller(source, FixedModel("a chair"), ScriptedSession::new().with(speech()));

        let summary = controller.run(cancel).await;

        let at = captured_at.lock().unwrap().clone();
        assert_eq!(at.len(), 3);
        let after_failure = at[1] - at[0];
        let after_success = at[2] - at[1];
        assert!(after_failure >= Duration::from_secs(3));
        assert!(after_failure < Duration::from_secs(10));
        assert!(after_success >= Duration::from_secs(10));
        assert_eq!(summary.iterations, 3);
    }

    #[tokio::test]
    async fn cancellation_closes_the_presenter() {
        let harness = Harness::new();
        let cancel = CancellationToken::new();
        let mut controller = harness.controller(
            ScriptedSource::new(vec![Ok(frame())]).cancel_after(1, cancel.clone()),
            FixedModel("a window"),
            ScriptedSession::new().with(speech()),
        );

        let summary = controller.run(cancel).await;

        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.output_dir, harness.output.path());
        assert!(*harness.presenter.closed.lock().unwrap());
        assert_eq!(controller.state(), ControllerState::Stopped);
    }

    #[tokio::test]
    async fn interrupt_before_the_first_iteration_runs_nothing() {
        let harness = Harness::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut controller = harness.controller(
            ScriptedSource::new(vec![]),
            FixedModel("unused"),
            ScriptedSession::new().with(speech()),
        );

        let summary = controller.run(cancel).await;

        assert_eq!(summary.iterations, 0);
        assert!(harness.presenter.rendered.lock().unwrap().is_empty());
        assert!(*harness.presenter.closed.lock().unwrap());
    }

    #[test]
    fn builder_reports_the_missing_part() {
        let result = PipelineController::builder()
            .writer(PersistenceWriter::new(&OutputSettings::default()))
            .build();
        assert!(matches!(result, Err(AppError::Pipeline(message)) if message == "frame source is required"));
    }

    #[tokio::test]
    async fn three_iterations_against_a_flaky_camera() {
        let harness = Harness::new();
        let camera = ScriptedService::new(VIDEO_DEVICE)
            .then("subscribeCamera", handle_reply("captionbot_0"))
            .then("subscribeCamera", Reply::Unsupported)
            .then("subscribeCamera", handle_reply("captionbot_2"))
            .on("subscribe", handle_reply("captionbot_1"))
            .then("getImageRemote", frame_reply(640, 480, [200, 180, 160]))
            .then("getImageRemote", frame_reply(640, 480, [20, 40, 60]))
            .then("getImageRemote", Reply::Value(Value::Null))
            .on("unsubscribe", Reply::ok());
        let session = Arc::new(ScriptedSession::new().with(camera.clone()).with(speech()));
        let acquirer = ImageAcquirer::new(
            session.clone(),
            CameraSettings {
                settle_ms: 0,
                ..CameraSettings::default()
            },
        );
        let mut controller = PipelineController::builder()
            .source(acquirer)
            .caption_service(caption_service(Arc::new(PickyModel), None))
            .writer(PersistenceWriter::new(&OutputSettings::default()))
            .output_directory(harness.output.clone())
            .presenter(harness.presenter.clone())
            .narrator(Narrator::new(session, &SpeechSettings::default()))
            .build()
            .unwrap();

        let first = completed(controller.run_once().await);
        let second = completed(controller.run_once().await);
        let third = completed(controller.run_once().await);

        assert!(!first.image.is_placeholder());
        assert_eq!((first.image.width(), first.image.height()), (640, 480));
        assert_eq!(first.caption, Caption::generated("a person waving"));
        assert!(first.is_clean());

        assert!(!second.image.is_placeholder());
        assert_eq!(*second.image.as_rgb().get_pixel(0, 0), Rgb([20, 40, 60]));
        assert_eq!(camera.calls_to("subscribe"), 1);

        assert!(third.image.is_placeholder());
        assert_eq!(third.caption, Caption::Failed);

        assert_eq!(camera.calls_to("subscribeCamera"), 3);
        assert_eq!(camera.calls_to("unsubscribe"), 3);
        assert_eq!(camera.calls_to("setActiveCamera"), 0);

        let images = harness.files("jpg");
        let captions = harness.files("txt");
        assert_eq!(images.len(), 3);
        assert_eq!(captions.len(), 3);
        assert!(images[0].file_name().unwrap().to_string_lossy().starts_with("robot_image_0001_"));
        assert!(images[2].file_name().unwrap().to_string_lossy().starts_with("robot_image_0003_"));
        assert!(
            fs::read_to_string(&captions[2])
                .unwrap()
                .ends_with(&format!("Caption: {}\n", CAPTION_FAILURE_SENTINEL))
        );
        assert_eq!(
            harness
                .presenter
                .rendered
                .lock()
                .unwrap()
                .iter()
                .map(|(i, _)| *i)
                .collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }
}
