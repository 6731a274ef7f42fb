use super::{AudioSink, SpeechSynthesizer, TokenProvider, VoiceSettings};
use crate::{SessionEvent, error::ChatError};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Hands rendered audio to the presentation layer as a session event.
pub struct ChannelAudioSink {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelAudioSink {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl AudioSink for ChannelAudioSink {
    async fn play(&self, audio: Bytes) -> Result<()> {
        self.events
            .send(SessionEvent::SpeechAudio(audio))
            .map_err(|_| anyhow!("audio consumer dropped"))
    }
}

/// Wraps one speech-synthesis attempt with a fixed locale and voice.
pub struct VoiceOutput {
    tokens: Arc<dyn TokenProvider>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    voice: VoiceSettings,
}

impl VoiceOutput {
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        voice: VoiceSettings,
    ) -> Self {
        Self {
            tokens,
            synthesizer,
            sink,
            voice,
        }
    }

    /// Synthesizes and plays `text` once. Resolves when playback has been
    /// handed off; failures are logged and reported as `false`.
    pub async fn speak(&self, text: &str) -> bool {
        match self.try_speak(text).await {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "Reply was not spoken");
                false
            }
        }
    }

    pub async fn try_speak(&self, text: &str) -> Result<(), ChatError> {
        let token = self
            .tokens
            .fetch_token()
            .await
            .map_err(|e| ChatError::TokenFailure(format!("{e:#}")))?;

        let audio = self
            .synthesizer
            .synthesize(&token, &self.voice, text)
            .await
            .map_err(|e| ChatError::SynthesisFailure(format!("{e:#}")))?;

        info!(bytes = audio.len(), "Playing synthesized reply");
        self.sink
            .play(audio)
            .await
            .map_err(|e| ChatError::SynthesisFailure(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{MockTokenProvider, SpeechToken};
    use std::sync::Mutex;

    #[derive(Default)]
    struct EchoSynthesizer {
        spoken: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for EchoSynthesizer {
        async fn synthesize(
            &self,
            _token: &SpeechToken,
            voice: &VoiceSettings,
            text: &str,
        ) -> Result<Bytes> {
            if self.fail {
                return Err(anyhow!("voice not found"));
            }
            self.spoken
                .lock()
                .unwrap()
                .push((voice.voice_name.clone(), text.to_string()));
            Ok(Bytes::from(text.as_bytes().to_vec()))
        }
    }

    fn tokens() -> Arc<MockTokenProvider> {
        let mut tokens = MockTokenProvider::new();
        tokens.expect_fetch_token().times(1).returning(|| {
            Ok(SpeechToken {
                auth_token: "token".to_string(),
                region: "westus".to_string(),
            })
        });
        Arc::new(tokens)
    }

    #[tokio::test]
    async fn test_speak_renders_with_fixed_voice_and_plays_once() {
        let synthesizer = Arc::new(EchoSynthesizer::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let output = VoiceOutput::new(
            tokens(),
            synthesizer.clone(),
            Arc::new(ChannelAudioSink::new(tx)),
            VoiceSettings::default(),
        );

        assert!(output.speak("Hello there.").await);

        assert_eq!(
            synthesizer.spoken.lock().unwrap().as_slice(),
            &[("en-US-JennyNeural".to_string(), "Hello there.".to_string())]
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::SpeechAudio(Bytes::from_static(b"Hello there."))
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_synthesis_failure_plays_nothing() {
        let synthesizer = Arc::new(EchoSynthesizer {
            fail: true,
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let output = VoiceOutput::new(
            tokens(),
            synthesizer,
            Arc::new(ChannelAudioSink::new(tx)),
            VoiceSettings::default(),
        );

        let err = output.try_speak("Hello").await.unwrap_err();
        assert_eq!(err, ChatError::SynthesisFailure("voice not found".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_sink_is_a_synthesis_failure() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let output = VoiceOutput::new(
            tokens(),
            Arc::new(EchoSynthesizer::default()),
            Arc::new(ChannelAudioSink::new(tx)),
            VoiceSettings::default(),
        );

        assert!(!output.speak("Hello").await);
    }
}
