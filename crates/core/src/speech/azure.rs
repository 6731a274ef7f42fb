//! Azure Speech REST implementations of the provider seams.

use super::{
    RecognitionReason, RecognitionResult, SpeechRecognizer, SpeechSynthesizer, SpeechToken,
    TokenProvider, VoiceSettings,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

/// Output format requested from the synthesis endpoint.
pub const SYNTHESIS_OUTPUT_FORMAT: &str = "riff-24khz-16bit-mono-pcm";

const RECOGNITION_CONTENT_TYPE: &str = "audio/wav; codecs=audio/pcm; samplerate=16000";

/// Issues tokens from a speech subscription key.
pub struct AzureTokenProvider {
    http: reqwest::Client,
    subscription_key: String,
    region: String,
}

impl AzureTokenProvider {
    pub fn new(subscription_key: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            subscription_key: subscription_key.into(),
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl TokenProvider for AzureTokenProvider {
    async fn fetch_token(&self) -> Result<SpeechToken> {
        let url = format!(
            "https://{}.api.cognitive.microsoft.com/sts/v1.0/issueToken",
            self.region
        );
        let auth_token = self
            .http
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .header(CONTENT_LENGTH, "0")
            .send()
            .await
            .context("Failed to reach token endpoint")?
            .error_for_status()
            .context("Token endpoint rejected the subscription key")?
            .text()
            .await?;
        debug!(region = %self.region, "Issued speech token");
        Ok(SpeechToken {
            auth_token,
            region: self.region.clone(),
        })
    }
}

/// Fetches tokens from an HTTP endpoint answering `{"token": ..., "region": ...}`.
pub struct HttpTokenProvider {
    http: reqwest::Client,
    url: String,
}

impl HttpTokenProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(&self) -> Result<SpeechToken> {
        let token = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("Failed to reach token endpoint")?
            .error_for_status()?
            .json::<SpeechToken>()
            .await
            .context("Malformed token response")?;
        Ok(token)
    }
}

/// Body of the short-audio recognition endpoint (simple format).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecognitionResponse {
    pub recognition_status: String,
    #[serde(default)]
    pub display_text: Option<String>,
}

impl From<RecognitionResponse> for RecognitionResult {
    fn from(response: RecognitionResponse) -> Self {
        let reason = match response.recognition_status.as_str() {
            "Success" => RecognitionReason::RecognizedSpeech,
            "NoMatch" | "InitialSilenceTimeout" | "BabbleTimeout" => RecognitionReason::NoMatch,
            _ => RecognitionReason::Canceled,
        };
        let text = match reason {
            RecognitionReason::RecognizedSpeech => response.display_text.unwrap_or_default(),
            _ => String::new(),
        };
        Self { reason, text }
    }
}

pub fn recognition_url(region: &str, locale: &str) -> String {
    format!(
        "https://{region}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1?language={locale}&format=simple"
    )
}

/// Recognizes one WAV utterance (16 kHz, 16-bit mono PCM).
#[derive(Default)]
pub struct AzureSpeechRecognizer {
    http: reqwest::Client,
}

impl AzureSpeechRecognizer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpeechRecognizer for AzureSpeechRecognizer {
    async fn recognize_once(
        &self,
        token: &SpeechToken,
        locale: &str,
        audio: Bytes,
    ) -> Result<RecognitionResult> {
        let response: RecognitionResponse = self
            .http
            .post(recognition_url(&token.region, locale))
            .header(AUTHORIZATION, format!("Bearer {}", token.auth_token))
            .header(CONTENT_TYPE, RECOGNITION_CONTENT_TYPE)
            .header(ACCEPT, "application/json")
            .body(audio)
            .send()
            .await
            .context("Failed to reach recognition endpoint")?
            .error_for_status()?
            .json()
            .await
            .context("Malformed recognition response")?;
        debug!(status = %response.recognition_status, "Recognition finished");
        Ok(response.into())
    }
}

pub fn synthesis_url(region: &str) -> String {
    format!("https://{region}.tts.speech.microsoft.com/cognitiveservices/v1")
}

/// Builds the SSML document for one utterance.
pub fn build_ssml(voice: &VoiceSettings, text: &str) -> String {
    format!(
        "<speak version='1.0' xml:lang='{locale}'><voice xml:lang='{locale}' name='{name}'>{text}</voice></speak>",
        locale = escape_xml(&voice.locale),
        name = escape_xml(&voice.voice_name),
        text = escape_xml(text),
    )
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders text to a RIFF/WAV byte stream.
#[derive(Default)]
pub struct AzureSpeechSynthesizer {
    http: reqwest::Client,
}

impl AzureSpeechSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpeechSynthesizer for AzureSpeechSynthesizer {
    async fn synthesize(
        &self,
        token: &SpeechToken,
        voice: &VoiceSettings,
        text: &str,
    ) -> Result<Bytes> {
        let audio = self
            .http
            .post(synthesis_url(&token.region))
            .header(AUTHORIZATION, format!("Bearer {}", token.auth_token))
            .header(CONTENT_TYPE, "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", SYNTHESIS_OUTPUT_FORMAT)
            .header(USER_AGENT, "parley")
            .body(build_ssml(voice, text))
            .send()
            .await
            .context("Failed to reach synthesis endpoint")?
            .error_for_status()?
            .bytes()
            .await?;
        debug!(bytes = audio.len(), voice = %voice.voice_name, "Synthesized reply");
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RecognitionResult {
        serde_json::from_str::<RecognitionResponse>(json)
            .unwrap()
            .into()
    }

    #[test]
    fn test_successful_recognition() {
        let result = parse(
            r#"{"RecognitionStatus": "Success", "DisplayText": "What time is it?", "Offset": 100, "Duration": 200}"#,
        );
        assert_eq!(result.reason, RecognitionReason::RecognizedSpeech);
        assert_eq!(result.text, "What time is it?");
    }

    #[test]
    fn test_silence_maps_to_no_match() {
        for status in ["NoMatch", "InitialSilenceTimeout", "BabbleTimeout"] {
            let result = parse(&format!(r#"{{"RecognitionStatus": "{status}"}}"#));
            assert_eq!(result.reason, RecognitionReason::NoMatch, "{status}");
            assert!(result.text.is_empty());
        }
    }

    #[test]
    fn test_provider_error_maps_to_canceled() {
        let result = parse(r#"{"RecognitionStatus": "Error", "DisplayText": "ignored"}"#);
        assert_eq!(result.reason, RecognitionReason::Canceled);
        assert!(result.text.is_empty());
    }

    #[test]
    fn test_endpoint_urls() {
        assert_eq!(
            recognition_url("westus", "en-US"),
            "https://westus.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1?language=en-US&format=simple"
        );
        assert_eq!(
            synthesis_url("eastus"),
            "https://eastus.tts.speech.microsoft.com/cognitiveservices/v1"
        );
    }

    #[test]
    fn test_ssml_uses_voice_and_escapes_text() {
        let ssml = build_ssml(&VoiceSettings::default(), "Tom & Jerry <3 'quotes'");
        assert_eq!(
            ssml,
            "<speak version='1.0' xml:lang='en-US'><voice xml:lang='en-US' name='en-US-JennyNeural'>Tom &amp; Jerry &lt;3 &apos;quotes&apos;</voice></speak>"
        );
    }

    #[test]
    fn test_token_provider_keeps_region() {
        let provider = AzureTokenProvider::new("key", "westeurope");
        assert_eq!(provider.region(), "westeurope");
    }
}
