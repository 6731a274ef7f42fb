//! Manages the WebSocket connection lifecycle for one conversation session.

use super::protocol::{ClientMessage, ServerMessage, microphone_input, visible_turns};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use parley_core::{SessionEvent, orchestrator::Orchestrator};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// The connection owns one session: a fresh orchestrator is created on
/// connect and torn down after the client leaves and every in-flight call
/// has settled.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", &session_id.to_string());
    info!("New WebSocket connection. Starting session...");

    let (mut socket_tx, mut socket_rx) = socket.split();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (inputs_tx, inputs_rx) = mpsc::channel(32);

    let mut orchestrator = Orchestrator::new(
        &state.session,
        state.completion.clone(),
        state.speech.clone(),
        events_tx,
    );

    let initialized = ServerMessage::Initialized {
        session_id,
        transcript: visible_turns(orchestrator.conversation().turns()),
    };
    if send_msg(&mut socket_tx, initialized).await.is_err() {
        error!("Failed to send Initialized message to client.");
        return;
    }

    let orchestrator_task = tokio::spawn(
        async move { orchestrator.run(inputs_rx).await }.instrument(tracing::Span::current()),
    );
    let writer_task = tokio::spawn(
        relay_events(events_rx, socket_tx).instrument(tracing::Span::current()),
    );

    while let Some(msg_result) = socket_rx.next().await {
        let input = match msg_result {
            Ok(Message::Text(text)) => serde_json::from_str::<ClientMessage>(&text)
                .map_err(anyhow::Error::from)
                .and_then(ClientMessage::into_input),
            Ok(Message::Binary(data)) => microphone_input(data),
            Ok(Message::Close(_)) => {
                info!("Client sent close frame. Ending session.");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        };

        match input {
            Ok(input) => {
                if inputs_tx.send(input).await.is_err() {
                    warn!("Session orchestrator stopped; closing connection.");
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Ignoring malformed client message."),
        }
    }

    // Closing the input channel lets the orchestrator settle in-flight calls
    // and exit, which in turn closes the event stream for the writer.
    drop(inputs_tx);
    if let Err(e) = orchestrator_task.await {
        error!(error = ?e, "Session orchestrator panicked.");
    }
    let _ = writer_task.await;
    info!("WebSocket connection closed and session terminated.");
}

/// Forwards session events to the client until the session ends.
async fn relay_events(
    mut events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    mut socket_tx: SplitSink<WebSocket, Message>,
) {
    while let Some(event) = events_rx.recv().await {
        for msg in ServerMessage::from_event(event) {
            if let Err(e) = send_msg(&mut socket_tx, msg).await {
                debug!(error = %e, "Client went away; dropping remaining session events.");
                return;
            }
        }
    }
    let _ = socket_tx.close().await;
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
