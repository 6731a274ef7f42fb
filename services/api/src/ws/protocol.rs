//! Defines the WebSocket message protocol between the browser client and the API server.

use crate::audio_utils;
use anyhow::{Result, anyhow};
use parley_core::{
    SessionEvent, SessionInput,
    conversation::{Role, Turn},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A typed submission from the input box.
    UserMessage { text: String },
    /// A microphone activation carrying the captured utterance (base64 WAV).
    Microphone { audio: String },
}

impl ClientMessage {
    /// Converts the message into a session trigger.
    pub fn into_input(self) -> Result<SessionInput> {
        match self {
            ClientMessage::UserMessage { text } => Ok(SessionInput::TypedSubmit(text)),
            ClientMessage::Microphone { audio } => {
                let audio = audio_utils::decode_audio(&audio)
                    .ok_or_else(|| anyhow!("microphone audio is not valid base64"))?;
                microphone_input(audio)
            }
        }
    }
}

/// Builds a microphone trigger from raw WAV bytes.
pub fn microphone_input(audio: impl Into<bytes::Bytes>) -> Result<SessionInput> {
    let audio = audio.into();
    if !audio_utils::is_wav(&audio) {
        return Err(anyhow!("microphone audio is not a WAV stream"));
    }
    Ok(SessionInput::MicrophonePressed(audio))
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the session and provides the visible transcript.
    Initialized {
        session_id: Uuid,
        transcript: Vec<Turn>,
    },
    /// A turn was added to the transcript.
    TurnAppended { role: Role, content: String },
    /// The microphone indicator should show "listening".
    ListeningStarted,
    /// The microphone indicator should return to idle.
    ListeningEnded,
    /// Signals that the AI has started speaking.
    AiSpeakingStart,
    /// Audio data (base64 encoded WAV) for the AI's voice.
    AudioChunk { data: String },
    /// Signals that the AI has finished speaking.
    AiSpeakingEnd,
}

impl ServerMessage {
    /// Maps one session event onto the messages the client expects.
    pub fn from_event(event: SessionEvent) -> Vec<ServerMessage> {
        match event {
            SessionEvent::TurnAppended(turn) => vec![ServerMessage::TurnAppended {
                role: turn.role,
                content: turn.content,
            }],
            SessionEvent::ListeningStarted => vec![ServerMessage::ListeningStarted],
            SessionEvent::ListeningEnded => vec![ServerMessage::ListeningEnded],
            SessionEvent::SpeechAudio(audio) => vec![
                ServerMessage::AiSpeakingStart,
                ServerMessage::AudioChunk {
                    data: audio_utils::encode_audio(&audio),
                },
                ServerMessage::AiSpeakingEnd,
            ],
        }
    }
}

/// The turns a client renders: everything except the system turn.
pub fn visible_turns(turns: &[Turn]) -> Vec<Turn> {
    turns
        .iter()
        .filter(|turn| turn.role != Role::System)
        .cloned()
        .collect()
}
