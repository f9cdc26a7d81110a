use std::sync::Arc;
use tracing::debug;

use crate::config::SpeechSettings;
use crate::error::RemoteError;
use crate::remote::{Session, TEXT_TO_SPEECH, TextToSpeech};

/// Speaks captions through the robot's text-to-speech service.
pub struct Narrator {
    session: Arc<dyn Session>,
    languages: Vec<String>,
    volume: f64,
}

impl Narrator {
    pub fn new(session: Arc<dyn Session>, settings: &SpeechSettings) -> Self {
        Self {
            session,
            languages: settings.languages.clone(),
            volume: settings.volume,
        }
    }

    pub async fn narrate(&self, text: &str) -> Result<(), RemoteError> {
        let tts = TextToSpeech::new(self.session.service(TEXT_TO_SPEECH).await?);

        if let Ok(available) = tts.available_languages().await {
            debug!("Speech languages available: {:?}", available);
        }

        for language in &self.languages {
            if tts.set_language(language).await.is_ok() {
                debug!("Speech language set to {}", language);
                break;
            }
        }

        tts.set_volume(self.volume).await?;
        tts.say(text).await
    }
}
