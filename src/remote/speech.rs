use crate::error::RemoteError;
use crate::remote::{ServiceHandle, Value};

/// Typed view over the text-to-speech service.
#[derive(Clone)]
pub struct TextToSpeech {
    service: ServiceHandle,
}

impl TextToSpeech {
    pub fn new(service: ServiceHandle) -> Self {
        Self { service }
    }

    pub async fn available_languages(&self) -> Result<Vec<String>, RemoteError> {
        let reply = self.service.call("getAvailableLanguages", vec![]).await?;
        Ok(reply
            .as_list()
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    pub async fn set_language(&self, language: &str) -> Result<(), RemoteError> {
        self.service
            .call("setLanguage", vec![language.into()])
            .await
            .map(drop)
    }

    pub async fn set_volume(&self, volume: f64) -> Result<(), RemoteError> {
        self.service
            .call("setVolume", vec![Value::Float(volume)])
            .await
            .map(drop)
    }

    pub async fn say(&self, text: &str) -> Result<(), RemoteError> {
        self.service.call("say", vec![text.into()]).await.map(drop)
    }
}
