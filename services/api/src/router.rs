//! Axum Router Configuration

use crate::{handlers, state::AppState, ws::ws_handler};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/openai-api-call", post(handlers::openai_api_call))
        .route("/api/get-speech-token", get(handlers::get_speech_token))
        .route("/ws", get(ws_handler))
        .route("/health", get(handlers::health))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use futures_util::{SinkExt, StreamExt};
    use parley_core::{
        config::SessionConfig,
        conversation::Turn,
        llm_client::CompletionClient,
        orchestrator::SpeechServices,
        speech::{
            SpeechToken, TokenProvider, Unconfigured,
            azure::{AzureSpeechRecognizer, AzureSpeechSynthesizer},
        },
    };
    use serde_json::{Value, json};
    use std::{net::SocketAddr, time::Duration};
    use tokio::net::TcpStream;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

    type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct EchoCompletion;

    #[async_trait]
    impl CompletionClient for EchoCompletion {
        async fn complete(&self, turns: Vec<Turn>) -> Result<String> {
            let last = turns.last().map(|t| t.content.clone()).unwrap_or_default();
            Ok(format!("You said: {last}"))
        }
    }

    struct FixedTokens;

    #[async_trait]
    impl TokenProvider for FixedTokens {
        async fn fetch_token(&self) -> Result<SpeechToken> {
            Ok(SpeechToken {
                auth_token: "abc".to_string(),
                region: "westus".to_string(),
            })
        }
    }

    fn test_state(token_issuer: Option<Arc<dyn TokenProvider>>) -> AppState {
        AppState {
            session: SessionConfig::default(),
            completion: Arc::new(EchoCompletion),
            speech: SpeechServices {
                tokens: Arc::new(Unconfigured),
                recognizer: Arc::new(AzureSpeechRecognizer::new()),
                synthesizer: Arc::new(AzureSpeechSynthesizer::new()),
            },
            openai: None,
            token_issuer,
        }
    }

    async fn spawn_app(state: AppState) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(Arc::new(state)))
                .await
                .unwrap();
        });
        addr
    }

    async fn next_json(ws: &mut ClientSocket) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for a server message")
                .expect("socket closed")
                .expect("socket error");
            if let tungstenite::Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn send_json(ws: &mut ClientSocket, value: Value) {
        ws.send(tungstenite::Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_health() {
        let addr = spawn_app(test_state(None)).await;
        let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_completion_proxy_without_key_is_unavailable() {
        let addr = spawn_app(test_state(None)).await;
        let response = reqwest::Client::new()
            .post(format!("http://{addr}/openai-api-call"))
            .json(&vec![Turn::system("Be brief."), Turn::user("Hi")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
        let body: Value = response.json().await.unwrap();
        assert!(body["message"].as_str().unwrap().contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn test_speech_token_endpoint() {
        let addr = spawn_app(test_state(Some(Arc::new(FixedTokens)))).await;
        let response = reqwest::get(format!("http://{addr}/api/get-speech-token"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let token: SpeechToken = response.json().await.unwrap();
        assert_eq!(token.auth_token, "abc");
        assert_eq!(token.region, "westus");
    }

    #[tokio::test]
    async fn test_speech_token_endpoint_without_subscription() {
        let addr = spawn_app(test_state(None)).await;
        let response = reqwest::get(format!("http://{addr}/api/get-speech-token"))
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
    }

    #[tokio::test]
    async fn test_ws_typed_turn_round_trip() {
        let addr = spawn_app(test_state(None)).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        let initialized = next_json(&mut ws).await;
        assert_eq!(initialized["type"], "initialized");
        assert_eq!(initialized["transcript"], json!([]));

        send_json(&mut ws, json!({"type": "user_message", "text": "Hello"})).await;

        assert_eq!(
            next_json(&mut ws).await,
            json!({"type": "turn_appended", "role": "user", "content": "Hello"})
        );
        assert_eq!(
            next_json(&mut ws).await,
            json!({"type": "turn_appended", "role": "assistant", "content": "You said: Hello"})
        );
    }

    #[tokio::test]
    async fn test_ws_voice_without_credentials_is_discarded() {
        let addr = spawn_app(test_state(None)).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        assert_eq!(next_json(&mut ws).await["type"], "initialized");

        ws.send(tungstenite::Message::Binary(
            b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec().into(),
        ))
        .await
        .unwrap();

        assert_eq!(next_json(&mut ws).await, json!({"type": "listening_started"}));
        assert_eq!(next_json(&mut ws).await, json!({"type": "listening_ended"}));

        // The session keeps serving typed turns after a failed voice attempt.
        send_json(&mut ws, json!({"type": "user_message", "text": "Still there?"})).await;
        assert_eq!(
            next_json(&mut ws).await,
            json!({"type": "turn_appended", "role": "user", "content": "Still there?"})
        );
        assert_eq!(
            next_json(&mut ws).await["content"],
            "You said: Still there?"
        );
    }

    #[tokio::test]
    async fn test_ws_malformed_message_is_ignored() {
        let addr = spawn_app(test_state(None)).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        assert_eq!(next_json(&mut ws).await["type"], "initialized");

        send_json(&mut ws, json!({"type": "set_voice_enabled", "enabled": true})).await;
        send_json(&mut ws, json!({"type": "user_message", "text": "Hi"})).await;

        assert_eq!(
            next_json(&mut ws).await,
            json!({"type": "turn_appended", "role": "user", "content": "Hi"})
        );
    }
}
