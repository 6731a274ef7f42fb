//! Turn-Taking Orchestrator
//!
//! The reactive controller of a session. It owns the [`Conversation`] and the
//! voice-origin flag, subscribes to the conversation's change notifications,
//! and re-evaluates two guarded rules on every change:
//!
//! 1. the last turn is `user`: request a completion with the full conversation;
//! 2. the last turn is `assistant` and the flag was raised when its user turn
//!    was committed: speak the reply and lower the flag.
//!
//! The flag's value is bound to each completion request at commit time, so
//! overlapping requests never speak each other's replies.
//!
//! Completion, recognition, and synthesis calls run as spawned tasks. Their
//! results re-enter the loop as [`Reaction`]s, so an in-flight call only
//! suspends its own reaction and every other trigger keeps flowing.

use crate::{
    SessionEvent, SessionInput,
    config::SessionConfig,
    conversation::{Conversation, ConversationSnapshot, Role},
    llm_client::{CompletionClient, complete_or_log},
    speech::{
        ChannelAudioSink, Recognition, SpeechRecognizer, SpeechSynthesizer, TokenProvider,
        VoiceInput, VoiceOutput,
    },
};
use bytes::Bytes;
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Where a user turn came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Typed,
    Voice,
}

/// Conceptual state, kept for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    AwaitingCompletion,
    AwaitingSynthesis,
}

/// Speech collaborators shared across sessions.
#[derive(Clone)]
pub struct SpeechServices {
    pub tokens: Arc<dyn TokenProvider>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Results of spawned calls, fed back into the loop.
#[derive(Debug)]
enum Reaction {
    /// `speak` is the voice flag as it stood when the user turn was committed.
    CompletionFinished { reply: Option<String>, speak: bool },
    RecognitionFinished(Recognition),
    SynthesisFinished,
}

/// Drives one session.
pub struct Orchestrator {
    conversation: Conversation,
    changes: mpsc::UnboundedReceiver<ConversationSnapshot>,
    comes_from_voice: bool,
    state: OrchestratorState,
    completion: Arc<dyn CompletionClient>,
    voice_input: Arc<VoiceInput>,
    voice_output: Arc<VoiceOutput>,
    events: mpsc::UnboundedSender<SessionEvent>,
    reactions_tx: mpsc::UnboundedSender<Reaction>,
    reactions_rx: mpsc::UnboundedReceiver<Reaction>,
    /// Flag value per committed user turn whose change is not yet handled.
    committed: VecDeque<bool>,
    /// Flag value per appended reply whose change is not yet handled.
    replies: VecDeque<bool>,
    completions: usize,
    syntheses: usize,
    recognitions: usize,
}

impl Orchestrator {
    /// Creates the session context: a fresh conversation holding only the
    /// system turn, and the voice adapters bound to `events`.
    pub fn new(
        config: &SessionConfig,
        completion: Arc<dyn CompletionClient>,
        speech: SpeechServices,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (changes_tx, changes) = mpsc::unbounded_channel();
        let (reactions_tx, reactions_rx) = mpsc::unbounded_channel();
        let conversation = Conversation::new(config.system_prompt.clone(), config.max_history)
            .with_observer(changes_tx);

        let voice_input = VoiceInput::new(
            speech.tokens.clone(),
            speech.recognizer,
            config.recognition_locale.clone(),
        );
        let voice_output = VoiceOutput::new(
            speech.tokens,
            speech.synthesizer,
            Arc::new(ChannelAudioSink::new(events.clone())),
            config.voice.clone(),
        );

        Self {
            conversation,
            changes,
            comes_from_voice: false,
            state: OrchestratorState::Idle,
            completion,
            voice_input: Arc::new(voice_input),
            voice_output: Arc::new(voice_output),
            events,
            reactions_tx,
            reactions_rx,
            committed: VecDeque::new(),
            replies: VecDeque::new(),
            completions: 0,
            syntheses: 0,
            recognitions: 0,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn comes_from_voice(&self) -> bool {
        self.comes_from_voice
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Processes triggers until `inputs` is closed and every in-flight call
    /// has settled.
    pub async fn run(&mut self, mut inputs: mpsc::Receiver<SessionInput>) {
        let mut inputs_open = true;
        loop {
            if !inputs_open && self.is_settled() {
                break;
            }
            tokio::select! {
                biased;
                Some(snapshot) = self.changes.recv() => self.on_conversation_change(snapshot),
                Some(reaction) = self.reactions_rx.recv() => self.on_reaction(reaction),
                input = inputs.recv(), if inputs_open => match input {
                    Some(input) => self.on_input(input),
                    None => {
                        debug!(in_flight = self.in_flight(), "Session input closed; settling");
                        inputs_open = false;
                    }
                },
                else => break,
            }
        }
        info!(turns = self.conversation.len(), "Session finished");
    }

    /// Commits a user turn together with its origin.
    ///
    /// For a voice turn the flag is raised before the turn is appended, within
    /// this one call, and the flag's value travels with the completion request
    /// the append triggers. A typed turn leaves the flag as it is. Returns
    /// whether a turn was added.
    pub fn commit_user_turn(&mut self, text: &str, origin: Origin) -> bool {
        if text.trim().is_empty() {
            debug!(?origin, "Ignoring empty submission");
            return false;
        }
        if origin == Origin::Voice {
            self.comes_from_voice = true;
        }
        let appended = self.conversation.append_user_turn(text);
        if appended {
            self.committed.push_back(self.comes_from_voice);
        }
        appended
    }

    fn in_flight(&self) -> usize {
        self.completions + self.syntheses + self.recognitions
    }

    fn is_settled(&self) -> bool {
        self.in_flight() == 0 && self.changes.is_empty() && self.reactions_rx.is_empty()
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Dropping session event: presentation layer is gone.");
        }
    }

    fn on_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::TypedSubmit(text) => {
                self.commit_user_turn(&text, Origin::Typed);
            }
            SessionInput::MicrophonePressed(audio) => self.start_recognition(audio),
        }
    }

    fn on_conversation_change(&mut self, snapshot: ConversationSnapshot) {
        let Some(last) = snapshot.last_turn().cloned() else {
            return;
        };
        self.emit(SessionEvent::TurnAppended(last.clone()));

        // Only a user turn asks for a completion; assistant and system turns
        // must never re-trigger one.
        if last.role == Role::User {
            let speak = self.committed.pop_front().unwrap_or(self.comes_from_voice);
            self.start_completion(snapshot, speak);
        }

        if last.role == Role::Assistant && self.replies.pop_front().unwrap_or(false) {
            self.start_synthesis(last.content);
            self.comes_from_voice = false;
        }
    }

    fn on_reaction(&mut self, reaction: Reaction) {
        match reaction {
            Reaction::CompletionFinished { reply, speak } => {
                self.completions = self.completions.saturating_sub(1);
                if let Some(reply) = reply {
                    self.replies.push_back(speak);
                    self.conversation.append_assistant_turn(&reply);
                }
            }
            Reaction::RecognitionFinished(recognition) => {
                self.recognitions = self.recognitions.saturating_sub(1);
                if recognition.recognized {
                    self.commit_user_turn(&recognition.text, Origin::Voice);
                } else {
                    debug!("Nothing recognized; conversation unchanged");
                }
            }
            Reaction::SynthesisFinished => {
                self.syntheses = self.syntheses.saturating_sub(1);
            }
        }
        self.refresh_state();
    }

    fn start_completion(&mut self, snapshot: ConversationSnapshot, speak: bool) {
        self.completions += 1;
        self.refresh_state();
        let client = self.completion.clone();
        let reactions = self.reactions_tx.clone();
        tokio::spawn(async move {
            let reply = complete_or_log(client.as_ref(), snapshot.turns).await;
            let _ = reactions.send(Reaction::CompletionFinished { reply, speak });
        });
    }

    fn start_synthesis(&mut self, text: String) {
        self.syntheses += 1;
        self.refresh_state();
        let voice_output = self.voice_output.clone();
        let reactions = self.reactions_tx.clone();
        tokio::spawn(async move {
            voice_output.speak(&text).await;
            let _ = reactions.send(Reaction::SynthesisFinished);
        });
    }

    fn start_recognition(&mut self, audio: Bytes) {
        self.recognitions += 1;
        let voice_input = self.voice_input.clone();
        let events = self.events.clone();
        let reactions = self.reactions_tx.clone();
        tokio::spawn(async move {
            let recognition = voice_input.recognize_once(audio, &events).await;
            let _ = reactions.send(Reaction::RecognitionFinished(recognition));
        });
    }

    /// A pending completion takes precedence over a pending synthesis.
    fn refresh_state(&mut self) {
        let next = if self.completions > 0 {
            OrchestratorState::AwaitingCompletion
        } else if self.syntheses > 0 {
            OrchestratorState::AwaitingSynthesis
        } else {
            OrchestratorState::Idle
        };
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Orchestrator state changed");
            self.state = next;
        }
    }
}
