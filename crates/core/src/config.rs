use crate::{
    llm_client::{CompletionClient, HttpCompletionClient, OpenAICompatibleClient},
    orchestrator::SpeechServices,
    speech::{
        TokenProvider, Unconfigured, VoiceSettings,
        azure::{
            AzureSpeechRecognizer, AzureSpeechSynthesizer, AzureTokenProvider, HttpTokenProvider,
        },
    },
};
use async_openai::config::OpenAIConfig;
use std::{net::SocketAddr, sync::Arc};
use tracing::{Level, info, warn};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an AI chatbot that answers questions in at most two sentences.";
pub const DEFAULT_MAX_HISTORY: usize = 10;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where completions come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionProvider {
    /// POST the conversation to `completion_url`.
    Proxy,
    /// Call an OpenAI-compatible API directly.
    OpenAI,
}

/// How speech tokens are obtained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpeechCredentials {
    /// A subscription key, exchanged for a token before every call.
    Subscription { key: String, region: String },
    /// A token endpoint answering `{"token": ..., "region": ...}`.
    TokenEndpoint(String),
    None,
}

/// Settings fixed for the lifetime of one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub max_history: usize,
    pub recognition_locale: String,
    pub voice: VoiceSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_history: DEFAULT_MAX_HISTORY,
            recognition_locale: "en-US".to_string(),
            voice: VoiceSettings::default(),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub completion_provider: CompletionProvider,
    pub completion_url: String,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub chat_model: String,
    pub speech: SpeechCredentials,
    pub session: SessionConfig,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let provider_str =
            std::env::var("COMPLETION_PROVIDER").unwrap_or_else(|_| "proxy".to_string());
        let completion_provider = match provider_str.to_lowercase().as_str() {
            "proxy" => CompletionProvider::Proxy,
            "openai" => CompletionProvider::OpenAI,
            other => {
                return Err(ConfigError::InvalidValue(
                    "COMPLETION_PROVIDER".to_string(),
                    format!("'{}' is not one of 'proxy', 'openai'", other),
                ));
            }
        };

        let completion_url = std::env::var("COMPLETION_URL")
            .unwrap_or_else(|_| "http://localhost:8000/openai-api-call".to_string());
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let openai_api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        if completion_provider == CompletionProvider::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
            ));
        }

        let speech = match (
            std::env::var("SPEECH_KEY").ok(),
            std::env::var("SPEECH_REGION").ok(),
        ) {
            (Some(key), Some(region)) => SpeechCredentials::Subscription { key, region },
            (Some(_), None) => return Err(ConfigError::MissingVar("SPEECH_REGION".to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingVar("SPEECH_KEY".to_string())),
            (None, None) => match std::env::var("SPEECH_TOKEN_URL") {
                Ok(url) => SpeechCredentials::TokenEndpoint(url),
                Err(_) => SpeechCredentials::None,
            },
        };

        let max_history_str =
            std::env::var("MAX_HISTORY").unwrap_or_else(|_| DEFAULT_MAX_HISTORY.to_string());
        let max_history = match max_history_str.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "MAX_HISTORY".to_string(),
                    format!("'{}' is not a positive integer", max_history_str),
                ));
            }
        };

        let session = SessionConfig {
            system_prompt: std::env::var("SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_history,
            recognition_locale: std::env::var("RECOGNITION_LOCALE")
                .unwrap_or_else(|_| "en-US".to_string()),
            voice: VoiceSettings {
                locale: std::env::var("SYNTHESIS_LOCALE").unwrap_or_else(|_| "en-US".to_string()),
                voice_name: std::env::var("SYNTHESIS_VOICE")
                    .unwrap_or_else(|_| "en-US-JennyNeural".to_string()),
            },
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            completion_provider,
            completion_url,
            openai_api_key,
            openai_api_base,
            chat_model,
            speech,
            session,
            log_level,
        })
    }

    /// The direct OpenAI-compatible client, when an API key is configured.
    pub fn openai_client(&self) -> Option<OpenAICompatibleClient> {
        let api_key = self.openai_api_key.as_ref()?;
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&self.openai_api_base);
        Some(OpenAICompatibleClient::new(
            openai_config,
            self.chat_model.clone(),
        ))
    }

    /// The client sessions use for completions.
    pub fn completion_client(&self) -> Arc<dyn CompletionClient> {
        match (&self.completion_provider, self.openai_client()) {
            (CompletionProvider::OpenAI, Some(client)) => {
                info!(model = %self.chat_model, "Using OpenAI-compatible completions.");
                Arc::new(client)
            }
            _ => {
                info!(url = %self.completion_url, "Using completion proxy.");
                Arc::new(HttpCompletionClient::new(self.completion_url.clone()))
            }
        }
    }

    /// Token provider backed by the speech subscription, if one is configured.
    pub fn subscription_tokens(&self) -> Option<AzureTokenProvider> {
        match &self.speech {
            SpeechCredentials::Subscription { key, region } => {
                Some(AzureTokenProvider::new(key.clone(), region.clone()))
            }
            _ => None,
        }
    }

    /// Speech collaborators for sessions.
    pub fn speech_services(&self) -> SpeechServices {
        let tokens: Arc<dyn TokenProvider> = match &self.speech {
            SpeechCredentials::Subscription { key, region } => {
                Arc::new(AzureTokenProvider::new(key.clone(), region.clone()))
            }
            SpeechCredentials::TokenEndpoint(url) => Arc::new(HttpTokenProvider::new(url.clone())),
            SpeechCredentials::None => {
                warn!("No speech credentials configured; voice input and output are disabled.");
                Arc::new(Unconfigured)
            }
        };
        SpeechServices {
            tokens,
            recognizer: Arc::new(AzureSpeechRecognizer::new()),
            synthesizer: Arc::new(AzureSpeechSynthesizer::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "COMPLETION_PROVIDER",
        "COMPLETION_URL",
        "OPENAI_API_KEY",
        "OPENAI_API_BASE",
        "CHAT_MODEL",
        "SPEECH_KEY",
        "SPEECH_REGION",
        "SPEECH_TOKEN_URL",
        "RECOGNITION_LOCALE",
        "SYNTHESIS_LOCALE",
        "SYNTHESIS_VOICE",
        "MAX_HISTORY",
        "SYSTEM_PROMPT",
        "RUST_LOG",
    ];

    fn clear_env_vars() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8000");
        assert_eq!(config.completion_provider, CompletionProvider::Proxy);
        assert_eq!(config.completion_url, "http://localhost:8000/openai-api-call");
        assert_eq!(config.openai_api_key, None);
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.speech, SpeechCredentials::None);
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.session.max_history, 10);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:9000");
            env::set_var("COMPLETION_PROVIDER", "OpenAI");
            env::set_var("OPENAI_API_KEY", "sk-test");
            env::set_var("CHAT_MODEL", "gpt-3.5-turbo");
            env::set_var("SPEECH_KEY", "speech-key");
            env::set_var("SPEECH_REGION", "westus");
            env::set_var("SYNTHESIS_VOICE", "en-GB-SoniaNeural");
            env::set_var("SYNTHESIS_LOCALE", "en-GB");
            env::set_var("MAX_HISTORY", "4");
            env::set_var("SYSTEM_PROMPT", "Be terse.");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:9000");
        assert_eq!(config.completion_provider, CompletionProvider::OpenAI);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.chat_model, "gpt-3.5-turbo");
        assert_eq!(
            config.speech,
            SpeechCredentials::Subscription {
                key: "speech-key".to_string(),
                region: "westus".to_string()
            }
        );
        assert_eq!(config.session.voice.voice_name, "en-GB-SoniaNeural");
        assert_eq!(config.session.voice.locale, "en-GB");
        assert_eq!(config.session.max_history, 4);
        assert_eq!(config.session.system_prompt, "Be terse.");
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_token_endpoint() {
        clear_env_vars();
        unsafe {
            env::set_var("SPEECH_TOKEN_URL", "http://localhost:8000/api/get-speech-token");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(
            config.speech,
            SpeechCredentials::TokenEndpoint("http://localhost:8000/api/get-speech-token".into())
        );
    }

    #[test]
    #[serial]
    fn test_openai_client_requires_key() {
        clear_env_vars();
        let config = Config::from_env().unwrap();
        assert!(config.openai_client().is_none());
        assert!(config.subscription_tokens().is_none());

        unsafe {
            env::set_var("OPENAI_API_KEY", "sk-test");
            env::set_var("SPEECH_KEY", "speech-key");
            env::set_var("SPEECH_REGION", "westus");
        }
        let config = Config::from_env().unwrap();
        assert!(config.openai_client().is_some());
        assert_eq!(
            config.subscription_tokens().map(|t| t.region().to_string()),
            Some("westus".to_string())
        );
    }

    #[test]
    #[serial]
    fn test_config_missing_openai_key() {
        clear_env_vars();
        unsafe {
            env::set_var("COMPLETION_PROVIDER", "openai");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::MissingVar(msg) => assert!(msg.contains("OPENAI_API_KEY")),
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_speech_key_without_region() {
        clear_env_vars();
        unsafe {
            env::set_var("SPEECH_KEY", "speech-key");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::MissingVar(var) => assert_eq!(var, "SPEECH_REGION"),
            _ => panic!("Expected MissingVar for SPEECH_REGION"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_values() {
        for (var, value) in [
            ("BIND_ADDRESS", "not-a-valid-address"),
            ("COMPLETION_PROVIDER", "carrier-pigeon"),
            ("MAX_HISTORY", "0"),
            ("MAX_HISTORY", "ten"),
            ("RUST_LOG", "not-a-level"),
        ] {
            clear_env_vars();
            unsafe {
                env::set_var(var, value);
            }

            match Config::from_env().unwrap_err() {
                ConfigError::InvalidValue(name, _) => assert_eq!(name, var),
                other => panic!("Expected InvalidValue for {var}, got {other:?}"),
            }
        }
    }
}
