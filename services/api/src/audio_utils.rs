use base64::Engine;
use bytes::Bytes;

/// Encodes audio bytes (a complete WAV stream) as standard base64.
pub fn encode_audio(audio: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(audio)
}

/// Decodes a base64 audio payload from the client.
pub fn decode_audio(base64_audio: &str) -> Option<Bytes> {
    match base64::engine::general_purpose::STANDARD.decode(base64_audio.trim()) {
        Ok(audio) => Some(Bytes::from(audio)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to decode base64 audio payload");
            None
        }
    }
}

/// Checks for a RIFF/WAVE header.
pub fn is_wav(audio: &[u8]) -> bool {
    audio.len() >= 12 && &audio[0..4] == b"RIFF" && &audio[8..12] == b"WAVE"
}
