use captionbot::app::{HeadlessPresenter, LivePresenter};
use captionbot::config::Settings;
use captionbot::error::AppError;
use captionbot::pipeline::caption::{SidecarCaptioner, caption_service};
use captionbot::pipeline::{
    ImageAcquirer, LoopTiming, Narrator, OutputDirectory, PersistenceWriter, PipelineController,
};
use captionbot::remote::{Session, TcpSession};
use chrono::Local;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};

fn init_logging(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let settings = Settings::load()?;
    init_logging(&settings.logging.level);
    info!("=== Robot camera captioning ===");

    let output = OutputDirectory::create(
        &settings.output.root,
        &settings.output.directory_prefix,
        Local::now(),
    )?;

    let address = settings.robot.address();
    info!("Connecting to robot at {}", address);
    let session: Arc<dyn Session> = Arc::new(
        TcpSession::connect(&address, settings.robot.connect_timeout())
            .await
            .inspect_err(|e| error!("Could not connect to robot at {}: {}", address, e))?,
    );

    let acquirer = ImageAcquirer::new(session.clone(), settings.camera.clone());
    acquirer.probe_cameras().await;

    let model = SidecarCaptioner::spawn(&settings.caption)
        .await
        .inspect_err(|e| error!("Could not load caption model: {}", e))?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            interrupt.cancel();
        }
    });

    let builder = PipelineController::builder()
        .source(acquirer)
        .caption_service(caption_service(Arc::new(model), settings.caption.timeout()))
        .writer(PersistenceWriter::new(&settings.output))
        .output_directory(output)
        .narrator(Narrator::new(session, &settings.speech))
        .timing(LoopTiming::from(&settings.pipeline));

    info!("Press Ctrl+C to stop");
    let summary = if settings.display.enabled {
        let (presenter, window) = LivePresenter::new(&settings.display);
        let mut controller = builder.presenter(presenter).build()?;

        let loop_cancel = cancel.clone();
        let pipeline = tokio::spawn(async move { controller.run(loop_cancel).await });

        // The window owns the main thread until it closes.
        let shown = window.run(cancel.clone());
        cancel.cancel();
        let summary = pipeline
            .await
            .map_err(|e| AppError::Pipeline(e.to_string()))?;
        shown?;
        summary
    } else {
        let mut controller = builder.presenter(HeadlessPresenter::new()).build()?;
        controller.run(cancel).await
    };

    info!(
        "Done: {} iterations, artifacts in {}",
        summary.iterations,
        summary.output_dir.display()
    );
    Ok(())
}
