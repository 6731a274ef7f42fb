//! Speech provider seams.
//!
//! The recognition and synthesis providers are black boxes behind the traits
//! below. Every recognition or synthesis attempt starts by asking a
//! [`TokenProvider`] for a fresh authorization token; tokens are short-lived
//! and never cached.
//!
//! - `azure`: REST implementations of the traits for Azure Speech.
//! - `input`: the Voice Input Adapter (one recognition attempt).
//! - `output`: the Voice Output Adapter (one synthesis-and-play attempt).

pub mod azure;
pub mod input;
pub mod output;

pub use input::{Recognition, VoiceInput};
pub use output::{ChannelAudioSink, VoiceOutput};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Authorization for one recognition or synthesis call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechToken {
    #[serde(rename = "token")]
    pub auth_token: String,
    pub region: String,
}

/// Out-of-band token acquisition.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<SpeechToken>;
}

/// Stands in when no speech credentials are configured; every voice attempt
/// then fails at the token step and is discarded.
pub struct Unconfigured;

#[async_trait]
impl TokenProvider for Unconfigured {
    async fn fetch_token(&self) -> Result<SpeechToken> {
        Err(anyhow::anyhow!("speech credentials are not configured"))
    }
}

/// Why a recognition attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionReason {
    RecognizedSpeech,
    /// Silence, or speech that could not be matched to text.
    NoMatch,
    /// The provider gave up or failed.
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    pub reason: RecognitionReason,
    pub text: String,
}

/// Single-shot speech recognition.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize_once(
        &self,
        token: &SpeechToken,
        locale: &str,
        audio: Bytes,
    ) -> Result<RecognitionResult>;
}

/// The fixed locale and voice used for every reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSettings {
    pub locale: String,
    pub voice_name: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            voice_name: "en-US-JennyNeural".to_string(),
        }
    }
}

/// Text-to-speech. Returns the rendered audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        token: &SpeechToken,
        voice: &VoiceSettings,
        text: &str,
    ) -> Result<Bytes>;
}

/// Plays rendered audio once.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: Bytes) -> Result<()>;
}
