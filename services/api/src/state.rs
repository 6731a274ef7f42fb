//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the collaborators
//! shared by every session. Session state itself is never shared: each
//! WebSocket connection builds its own orchestrator.

use parley_core::{
    config::{Config, SessionConfig},
    llm_client::{CompletionClient, OpenAICompatibleClient},
    orchestrator::SpeechServices,
    speech::TokenProvider,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: SessionConfig,
    /// Client used by sessions.
    pub completion: Arc<dyn CompletionClient>,
    pub speech: SpeechServices,
    /// Backs the completion proxy endpoint.
    pub openai: Option<Arc<OpenAICompatibleClient>>,
    /// Backs the speech-token endpoint.
    pub token_issuer: Option<Arc<dyn TokenProvider>>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            session: config.session.clone(),
            completion: config.completion_client(),
            speech: config.speech_services(),
            openai: config.openai_client().map(Arc::new),
            token_issuer: config
                .subscription_tokens()
                .map(|tokens| Arc::new(tokens) as Arc<dyn TokenProvider>),
        }
    }
}
