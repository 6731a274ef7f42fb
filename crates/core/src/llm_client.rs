use crate::{
    conversation::{Role, Turn},
    error::ChatError,
};
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Response body of the remote completion service.
///
/// Only `choices[0].message.content` is consumed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChoiceMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
}

impl CompletionResponse {
    /// Wraps a single assistant reply in the service's response shape.
    pub fn from_reply(content: impl Into<String>) -> Self {
        Self {
            choices: vec![CompletionChoice {
                message: ChoiceMessage {
                    role: Some(Role::Assistant),
                    content: Some(content.into()),
                },
            }],
        }
    }

    /// Extracts the text of the first choice.
    pub fn into_reply(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .context("No response choice from completion service")?
            .message
            .content
            .context("No content in completion response")
    }
}

/// A client for the remote completion service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Sends the full ordered conversation, system turn included, and returns
    /// the assistant's reply.
    async fn complete(&self, turns: Vec<Turn>) -> Result<String>;
}

/// Calls the completion client and swallows any failure.
///
/// `None` means "do not append anything". Failures are logged and never
/// retried.
pub async fn complete_or_log(client: &dyn CompletionClient, turns: Vec<Turn>) -> Option<String> {
    match client.complete(turns).await {
        Ok(reply) => Some(reply),
        Err(e) => {
            let err = ChatError::NetworkFailure(format!("{e:#}"));
            error!(error = %err, "Completion failed; conversation will not advance");
            None
        }
    }
}

/// Posts the conversation as a JSON array to a completion endpoint.
pub struct HttpCompletionClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpCompletionClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, turns: Vec<Turn>) -> Result<String> {
        debug!(endpoint = %self.endpoint, turns = turns.len(), "Requesting completion");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&turns)
            .send()
            .await
            .context("Failed to reach completion endpoint")?
            .error_for_status()
            .context("Completion endpoint returned an error status")?;

        let body: CompletionResponse = response
            .json()
            .await
            .context("Malformed completion response")?;
        body.into_reply()
    }
}

/// An implementation of `CompletionClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }

    /// Runs one chat completion and returns it in the completion service's
    /// response shape.
    pub async fn create(&self, turns: &[Turn]) -> Result<CompletionResponse> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(to_request_messages(turns)?)
            .build()?;

        let response: CreateChatCompletionResponse = self.client.chat().create(request).await?;
        Ok(CompletionResponse {
            choices: response
                .choices
                .into_iter()
                .map(|choice| CompletionChoice {
                    message: ChoiceMessage {
                        role: Some(Role::Assistant),
                        content: choice.message.content,
                    },
                })
                .collect(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    async fn complete(&self, turns: Vec<Turn>) -> Result<String> {
        self.create(&turns).await?.into_reply()
    }
}

/// Maps conversation turns onto chat request messages of the same role.
pub fn to_request_messages(turns: &[Turn]) -> Result<Vec<ChatCompletionRequestMessage>> {
    turns
        .iter()
        .map(|turn| {
            let message: ChatCompletionRequestMessage = match turn.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(turn.content.clone())
                    .build()?
                    .into(),
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.clone())
                    .build()?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.clone())
                    .build()?
                    .into(),
            };
            Ok(message)
        })
        .collect()
}
