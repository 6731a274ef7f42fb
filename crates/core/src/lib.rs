pub mod config;
pub mod conversation;
pub mod error;
pub mod llm_client;
pub mod orchestrator;
pub mod speech;

use bytes::Bytes;
use conversation::Turn;

/// Triggers the presentation layer feeds into a session.
#[derive(Debug, Clone)]
pub enum SessionInput {
    /// The user submitted the text in the input box.
    TypedSubmit(String),
    /// The user pressed the microphone; carries the captured utterance (WAV).
    MicrophonePressed(Bytes),
}

/// Signals a session emits back to the presentation layer.
///
/// The core never renders anything itself; front-ends map these onto a
/// transcript, a listening indicator, and audio playback.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A turn was appended to the conversation.
    TurnAppended(Turn),
    /// A recognition attempt has started.
    ListeningStarted,
    /// The recognition attempt has ended, successfully or not.
    ListeningEnded,
    /// Synthesized speech (WAV) to play once.
    SpeechAudio(Bytes),
}
