//! Error kinds raised at the adapter boundaries.
//!
//! None of these reach the person using the system: the adapter that catches
//! one logs it and the conversation simply does not advance.

/// A failure in one of the external collaborators of a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Completion request failed: {0}")]
    NetworkFailure(String),
    #[error("Speech recognition failed: {0}")]
    RecognitionFailure(String),
    #[error("Speech synthesis failed: {0}")]
    SynthesisFailure(String),
    #[error("Speech token request failed: {0}")]
    TokenFailure(String),
}
