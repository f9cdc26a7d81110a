use async_trait::async_trait;
use chrono::Local;
use egui::{ColorImage, TextureHandle, TextureOptions, ViewportCommand};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app::presenter::{Presenter, caption_line, frame_title};
use crate::config::DisplaySettings;
use crate::error::{AppError, PresenterError};
use crate::pipeline::types::{CanonicalImage, Caption};

pub const WINDOW_TITLE: &str = "Robot Camera Feed";

struct Snapshot {
    image: CanonicalImage,
    title: String,
    caption: String,
}

#[derive(Default)]
struct Shared {
    pending: Option<Snapshot>,
    ctx: Option<egui::Context>,
    closed: bool,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Controller-side handle of the live window. Renders hand the newest frame
/// to the UI thread and ask it to repaint.
pub struct LivePresenter {
    shared: Arc<Mutex<Shared>>,
    redraw_pause: Duration,
}

/// UI-thread side of the live window; must be run on the main thread.
pub struct LiveWindow {
    shared: Arc<Mutex<Shared>>,
    width: f32,
    height: f32,
}

impl LivePresenter {
    pub fn new(settings: &DisplaySettings) -> (Self, LiveWindow) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: shared.clone(),
                redraw_pause: settings.redraw_pause(),
            },
            LiveWindow {
                shared,
                width: settings.width,
                height: settings.height,
            },
        )
    }
}

#[async_trait]
impl Presenter for LivePresenter {
    async fn render(
        &mut self,
        image: &CanonicalImage,
        caption: &Caption,
        iteration: u64,
    ) -> Result<(), PresenterError> {
        {
            let mut shared = lock(&self.shared);
            if shared.closed {
                return Err(PresenterError::Closed);
            }
            shared.pending = Some(Snapshot {
                image: image.clone(),
                title: frame_title(iteration, Local::now()),
                caption: caption_line(caption),
            });
            if let Some(ctx) = &shared.ctx {
                ctx.request_repaint();
            }
        }
        tokio::time::sleep(self.redraw_pause).await;
        Ok(())
    }

    async fn close(&mut self) {
        let mut shared = lock(&self.shared);
        shared.closed = true;
        shared.pending = None;
        if let Some(ctx) = &shared.ctx {
            ctx.send_viewport_cmd(ViewportCommand::Close);
        }
    }
}

impl LiveWindow {
    /// Blocks until the window is closed. Closing the window cancels `cancel`.
    pub fn run(self, cancel: CancellationToken) -> Result<(), AppError> {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size(egui::vec2(self.width, self.height))
                .with_title(WINDOW_TITLE),
            ..Default::default()
        };

        let shared = self.shared;
        eframe::run_native(
            WINDOW_TITLE,
            options,
            Box::new(move |cc| {
                lock(&shared).ctx = Some(cc.egui_ctx.clone());
                Ok(Box::new(LiveView::new(shared, cancel)))
            }),
        )
        .map_err(|e| AppError::Ui(e.to_string()))
    }
}

struct LiveView {
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
    texture: Option<TextureHandle>,
    title: String,
    caption: String,
}

impl LiveView {
    fn new(shared: Arc<Mutex<Shared>>, cancel: CancellationToken) -> Self {
        Self {
            shared,
            cancel,
            texture: None,
            title: "Waiting for the first frame".to_string(),
            caption: String::new(),
        }
    }

    /// Set once the controller has shut down, whether or not it reached the context.
    fn closed_by_controller(&self) -> bool {
        lock(&self.shared).closed
    }

    fn take_snapshot(&mut self, ctx: &egui::Context) {
        let Some(snapshot) = lock(&self.shared).pending.take() else {
            return;
        };
        let color_image = to_color_image(&snapshot.image);
        match &mut self.texture {
            Some(texture) => texture.set(color_image, TextureOptions::default()),
            None => {
                self.texture =
                    Some(ctx.load_texture("robot_frame", color_image, TextureOptions::default()))
            }
        }
        self.title = snapshot.title;
        self.caption = snapshot.caption;
    }
}

fn to_color_image(image: &CanonicalImage) -> ColorImage {
    let rgb = image.as_rgb();
    ColorImage::from_rgb(
        [rgb.width() as usize, rgb.height() as usize],
        rgb.as_raw().as_slice(),
    )
}

impl eframe::App for LiveView {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.viewport().close_requested()) {
            info!("Display window closed");
            self.cancel.cancel();
        }
        if self.closed_by_controller() {
            ctx.send_viewport_cmd(ViewportCommand::Close);
            return;
        }

        self.take_snapshot(ctx);

        egui::TopBottomPanel::bottom("caption_panel")
            .resizable(false)
            .min_height(80.0)
            .show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    ui.add_space(12.0);
                    ui.label(egui::RichText::new(&self.caption).size(18.0));
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading(&self.title);
                ui.separator();
                if let Some(texture) = &self.texture {
                    ui.add(egui::Image::new(texture).shrink_to_fit());
                }
            });
        });
        debug!("Redrew live view");
    }
}
