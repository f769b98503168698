//! WebSocket gateway — every connected client receives the full event bus
//! fan-out and may push back `process`/`input`/`respond`/`cancel` control
//! frames without a separate HTTP round trip.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Process { session_id: String, text: String, preferred_model: Option<String>, reasoning_level: Option<String> },
    #[serde(rename_all = "camelCase")]
    Input { session_id: String, text: String },
    #[serde(rename_all = "camelCase")]
    Respond {
        session_id: String,
        request_id: Option<uuid::Uuid>,
        selection: Option<String>,
        text: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    CancelSessionWorkers { session_id: String },
    Cancel,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.bus.subscribe();

    let forward = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else { continue };
                    if sender.send(WsMessage::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let WsMessage::Text(text) = msg else { continue };
        let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) else { continue };
        match frame {
            ClientFrame::Process { session_id, text, preferred_model, reasoning_level } => {
                state.manager.process(session_id, text, preferred_model, reasoning_level);
            }
            ClientFrame::Input { session_id, text } => {
                state.manager.handle_user_input(session_id, text);
            }
            ClientFrame::Respond { session_id, request_id, selection, text } => {
                state.manager.handle_session_response(
                    &session_id,
                    request_id,
                    kory_prompts::PromptAnswer { selection, text },
                );
            }
            ClientFrame::CancelSessionWorkers { session_id } => {
                state.manager.cancel_session_workers(&session_id);
            }
            ClientFrame::Cancel => {
                state.manager.cancel();
            }
        }
    }

    forward.abort();
}
