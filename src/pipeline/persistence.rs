use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::OutputSettings;
use crate::error::PersistError;
use crate::pipeline::types::{CanonicalImage, Caption};

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Run-scoped directory holding every artifact of one run.
#[derive(Debug, Clone)]
pub struct OutputDirectory {
    path: PathBuf,
}

impl OutputDirectory {
    /// Creates `<root>/<prefix>_<YYYYMMDD_HHMMSS>`.
    pub fn create(root: &Path, prefix: &str, started: DateTime<Local>) -> std::io::Result<Self> {
        let path = root.join(format!("{}_{}", prefix, started.format(STAMP_FORMAT)));
        fs::create_dir_all(&path)?;
        info!("Output directory: {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Writes the image and caption artifacts of one iteration.
#[derive(Debug, Clone)]
pub struct PersistenceWriter {
    file_prefix: String,
    jpeg_quality: u8,
}

impl PersistenceWriter {
    pub fn new(settings: &OutputSettings) -> Self {
        Self {
            file_prefix: settings.file_prefix.clone(),
            jpeg_quality: settings.jpeg_quality,
        }
    }

    /// Writes `<prefix>_<iteration:04>_<stamp>.jpg` and, for a non-empty caption,
    /// a sibling `.txt`. Returns the image path.
    pub async fn persist(
        &self,
        image: &CanonicalImage,
        caption: &Caption,
        dir: &OutputDirectory,
        iteration: u64,
        at: DateTime<Local>,
    ) -> Result<PathBuf, PersistError> {
        let writer = self.clone();
        let image = image.clone();
        let caption = caption.as_str().to_string();
        let dir = dir.path().to_path_buf();

        tokio::task::spawn_blocking(move || writer.write(&image, &caption, &dir, iteration, at))
            .await
            .map_err(|e| PersistError::Task(e.to_string()))?
    }

    fn write(
        &self,
        image: &CanonicalImage,
        caption: &str,
        dir: &Path,
        iteration: u64,
        at: DateTime<Local>,
    ) -> Result<PathBuf, PersistError> {
        let stem = format!(
            "{}_{:04}_{}",
            self.file_prefix,
            iteration,
            at.format(STAMP_FORMAT)
        );

        let image_path = dir.join(format!("{}.jpg", stem));
        let mut out = BufWriter::new(File::create(&image_path)?);
        JpegEncoder::new_with_quality(&mut out, self.jpeg_quality).encode_image(image.as_rgb())?;
        out.flush()?;

        if !caption.is_empty() {
            let text_path = dir.join(format!("{}.txt", stem));
            fs::write(
                &text_path,
                format!(
                    "Timestamp: {}\nCaption: {}\n",
                    at.format("%Y-%m-%d %H:%M:%S"),
                    caption
                ),
            )?;
        }

        Ok(image_path)
    }
}
