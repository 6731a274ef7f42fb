use super::{RecognitionReason, SpeechRecognizer, TokenProvider};
use crate::{SessionEvent, error::ChatError};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outcome of one recognition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    pub text: String,
    pub recognized: bool,
}

impl Recognition {
    pub fn recognized(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            recognized: true,
        }
    }

    pub fn not_recognized() -> Self {
        Self {
            text: String::new(),
            recognized: false,
        }
    }
}

/// Wraps one speech-recognition attempt for a fixed locale.
pub struct VoiceInput {
    tokens: Arc<dyn TokenProvider>,
    recognizer: Arc<dyn SpeechRecognizer>,
    locale: String,
}

impl VoiceInput {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        recognizer: Arc<dyn SpeechRecognizer>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            recognizer,
            locale: locale.into(),
        }
    }

    /// Runs exactly one recognition attempt over the captured utterance.
    ///
    /// `ListeningStarted` and `ListeningEnded` bracket the attempt on `events`.
    /// Failures are logged and reported as `recognized = false`.
    pub async fn recognize_once(
        &self,
        audio: Bytes,
        events: &mpsc::UnboundedSender<SessionEvent>,
    ) -> Recognition {
        signal(events, SessionEvent::ListeningStarted);
        let outcome = self.try_recognize(audio).await;
        signal(events, SessionEvent::ListeningEnded);

        match outcome {
            Ok(text) => {
                info!(chars = text.len(), "Recognized speech");
                Recognition::recognized(text)
            }
            Err(err) => {
                warn!(error = %err, "Voice input discarded");
                Recognition::not_recognized()
            }
        }
    }

    /// Same attempt as [`recognize_once`](Self::recognize_once), without
    /// signals, returning the failure kind.
    pub async fn try_recognize(&self, audio: Bytes) -> Result<String, ChatError> {
        let token = self
            .tokens
            .fetch_token()
            .await
            .map_err(|e| ChatError::TokenFailure(format!("{e:#}")))?;

        let result = self
            .recognizer
            .recognize_once(&token, &self.locale, audio)
            .await
            .map_err(|e| ChatError::RecognitionFailure(format!("{e:#}")))?;

        match result.reason {
            RecognitionReason::RecognizedSpeech if !result.text.trim().is_empty() => Ok(result.text),
            RecognitionReason::RecognizedSpeech => Err(ChatError::RecognitionFailure(
                "recognized speech was empty".to_string(),
            )),
            RecognitionReason::NoMatch => Err(ChatError::RecognitionFailure(
                "no speech could be recognized".to_string(),
            )),
            RecognitionReason::Canceled => Err(ChatError::RecognitionFailure(
                "recognition was canceled by the provider".to_string(),
            )),
        }
    }
}

fn signal(events: &mpsc::UnboundedSender<SessionEvent>, event: SessionEvent) {
    if events.send(event).is_err() {
        debug!("Listening indicator dropped: presentation layer is gone.");
    }
}
