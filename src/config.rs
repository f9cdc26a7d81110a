use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

const DEFAULT_CONFIG_FILE: &str = "captionbot";
const CONFIG_FILE_ENV: &str = "CAPTIONBOT_CONFIG";
const ENV_PREFIX: &str = "CAPTIONBOT";

/// Runtime settings, layered as defaults < config file < environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub robot: RobotSettings,
    pub camera: CameraSettings,
    pub caption: CaptionSettings,
    pub speech: SpeechSettings,
    pub output: OutputSettings,
    pub display: DisplaySettings,
    pub pipeline: PipelineSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Loads `captionbot.toml` (or the file named by `CAPTIONBOT_CONFIG`) if present,
    /// then applies `CAPTIONBOT__SECTION__KEY` overrides.
    pub fn load() -> Result<Self, AppError> {
        let file = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let config = Config::builder()
            .add_source(File::with_name(&file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("caption.args")
                    .with_list_parse_key("speech.languages")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobotSettings {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
}

impl RobotSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            host: "172.15.1.29".to_string(),
            port: 9559,
            connect_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// 0 is the top camera.
    pub camera_index: i64,
    /// Resolution tier, 2 = VGA (640x480).
    pub resolution: i64,
    /// Color space tag, 11 = RGB.
    pub color_space: i64,
    pub fps: i64,
    /// Subscription name, also the fixed client id of the imperative strategy.
    pub client_name: String,
    pub settle_ms: u64,
    pub photo_path: String,
    pub photo_resolution: i64,
    pub photo_format: String,
}

impl CameraSettings {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            camera_index: 0,
            resolution: 2,
            color_space: 11,
            fps: 5,
            client_name: "captionbot".to_string(),
            settle_ms: 100,
            photo_path: "/tmp/captionbot_photo.jpg".to_string(),
            photo_resolution: 2,
            photo_format: "jpg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptionSettings {
    pub command: String,
    pub args: Vec<String>,
    pub frame_path: PathBuf,
    pub max_length: u32,
    pub load_timeout_ms: u64,
    /// Zero disables the inference timeout.
    pub timeout_ms: u64,
}

impl CaptionSettings {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self {
            command: "python3".to_string(),
            args: vec!["scripts/caption_server.py".to_string()],
            frame_path: PathBuf::from("/tmp/captionbot_frame.jpg"),
            max_length: 50,
            load_timeout_ms: 120_000,
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Tried in order until the speech service accepts one.
    pub languages: Vec<String>,
    pub volume: f64,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            languages: vec!["English".to_string(), "en-US".to_string()],
            volume: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub root: PathBuf,
    pub directory_prefix: String,
    pub file_prefix: String,
    pub jpeg_quality: u8,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            directory_prefix: "robot_captures".to_string(),
            file_prefix: "robot_image".to_string(),
            jpeg_quality: 95,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub enabled: bool,
    pub width: f32,
    pub height: f32,
    pub redraw_pause_ms: u64,
}

impl DisplaySettings {
    pub fn redraw_pause(&self) -> Duration {
        Duration::from_millis(self.redraw_pause_ms)
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 1000.0,
            height: 800.0,
            redraw_pause_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub interval_ms: u64,
    pub capture_retry_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            capture_retry_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn defaults_match_the_robot_camera_setup() {
        let settings = Settings::default();
        assert_eq!(settings.robot.address(), "172.15.1.29:9559");
        assert_eq!(settings.camera.resolution, 2);
        assert_eq!(settings.camera.color_space, 11);
        assert_eq!(settings.pipeline.interval_ms, 5_000);
        assert_eq!(settings.output.jpeg_quality, 95);
        assert_eq!(settings.speech.languages, vec!["English", "en-US"]);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let toml = r#"
            [robot]
            host = "10.0.0.7"

            [pipeline]
            interval_ms = 1500
        "#;
        let settings: Settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.robot.host, "10.0.0.7");
        assert_eq!(settings.robot.port, 9559);
        assert_eq!(settings.pipeline.interval_ms, 1500);
        assert_eq!(settings.pipeline.capture_retry_ms, 5_000);
        assert_eq!(settings.caption.max_length, 50);
    }

    #[test]
    fn zero_caption_timeout_disables_it() {
        let mut caption = CaptionSettings::default();
        assert_eq!(caption.timeout(), Some(Duration::from_secs(60)));
        caption.timeout_ms = 0;
        assert_eq!(caption.timeout(), None);
    }
}
