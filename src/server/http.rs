//! HTTP and WebSocket surface
//!
//! Thin I/O wrappers over the coordinator: room creation, the media upload
//! endpoint, and the per-connection WebSocket loop. All room semantics live
//! in [`crate::coordinator`]; nothing here mutates room state directly.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Multipart, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::coordinator::Coordinator;
use crate::room::{InboundEvent, OutboundEvent, RoomToken};
use crate::storage::{ObjectStorage, ResourceType};

use super::config::ServerConfig;

/// Shared state handed to every handler
pub struct AppState<S: ObjectStorage> {
    pub coordinator: Arc<Coordinator<S>>,
    pub config: Arc<ServerConfig>,
}

// Manual impl: `S` itself need not be `Clone` behind the `Arc`s.
impl<S: ObjectStorage> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            config: Arc::clone(&self.config),
        }
    }
}

/// Response to a room creation request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatResponse {
    pub room_id: String,
    pub link: String,
}

/// Response to a successful upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub media_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

/// `GET /create-chat`: mint a room and hand back its token and join link
pub async fn create_chat<S: ObjectStorage>(
    State(state): State<AppState<S>>,
) -> Json<CreateChatResponse> {
    let token = state.coordinator.create_room().await;
    let link = state.config.room_link(&token);

    Json(CreateChatResponse {
        room_id: token.to_string(),
        link,
    })
}

/// `POST /upload`: forward a multipart file to object storage
///
/// Declared content type picks the resource class; absent file is a 400,
/// storage failure a 500. Room state is untouched either way; the client
/// associates the returned media ID with its room via the WebSocket notice.
pub async fn upload<S: ObjectStorage>(
    State(state): State<AppState<S>>,
    mut multipart: Multipart,
) -> Response {
    // Each field borrows the multipart stream, so the match is consumed
    // in full before the next call to `next_field`.
    let mut file = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let resource_type = ResourceType::from_content_type(field.content_type());
        let filename = field.file_name().unwrap_or("upload").to_string();
        match field.bytes().await {
            Ok(data) => file = Some((resource_type, filename, data)),
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        message: format!("Malformed upload: {}", e),
                    }),
                )
                    .into_response();
            }
        }
        break;
    }

    let Some((resource_type, filename, data)) = file else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                message: "No file uploaded".to_string(),
            }),
        )
            .into_response();
    };

    match state
        .coordinator
        .storage()
        .upload(data.to_vec(), filename, resource_type)
        .await
    {
        Ok(media) => (
            StatusCode::OK,
            Json(UploadResponse {
                url: media.url,
                media_id: media.media_id,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Upload to object storage failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// `GET /ws`: upgrade to the persistent relay connection
pub async fn ws_handler<S: ObjectStorage>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection event loop
///
/// One writer task drains the member channel onto the socket; the read half
/// feeds inbound events to the coordinator. The first accepted event must
/// be a join; everything room-scoped before that is ignored.
async fn handle_socket<S: ObjectStorage>(socket: WebSocket, state: AppState<S>) {
    let session_id = state.coordinator.sessions().allocate();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (sender, mut outbound_rx) = mpsc::unbounded_channel::<OutboundEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize outbound event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    tracing::debug!(session_id = session_id, "Connection opened");

    let mut joined: Option<RoomToken> = None;
    while let Some(Ok(message)) = ws_rx.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let event = match serde_json::from_str::<InboundEvent>(&text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(session_id = session_id, error = %e, "Malformed inbound event");
                continue;
            }
        };

        match event {
            InboundEvent::JoinRoom { room_id, name } => {
                if joined.is_some() {
                    // One room per connection; repeat joins are ignored.
                    continue;
                }
                let token = RoomToken::new(room_id);
                if state
                    .coordinator
                    .join(&token, name, session_id, sender.clone())
                    .await
                {
                    joined = Some(token);
                }
            }
            InboundEvent::ChatMessage { payload } => {
                if let Some(token) = &joined {
                    state.coordinator.message(token, session_id, payload).await;
                }
            }
            InboundEvent::MediaUploaded { media_id } => {
                if let Some(token) = &joined {
                    state.coordinator.media_attached(token, &media_id).await;
                }
            }
        }
    }

    if let Some(token) = &joined {
        state.coordinator.disconnect(token, session_id).await;
    }
    writer.abort();

    tracing::debug!(session_id = session_id, "Connection closed");
}
