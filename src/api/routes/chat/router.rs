//! Router for the chat API

use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::anyhow;
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response, sse::Event, sse::KeepAlive, sse::Sse},
    routing::post,
};
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::public;
use crate::api::public::ApiError;
use crate::api::state::{AppState, SessionHandle};

type SharedState = Arc<RwLock<AppState>>;

fn find_session(state: &SharedState, id: &str) -> Result<Option<SessionHandle>, ApiError> {
    let shared_state = state
        .read()
        .map_err(|e| anyhow!("Unable to read shared state: {}", e))?;
    Ok(shared_state.session(id))
}

fn session_not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        format!("Chat session {} not found", id),
    )
        .into_response()
}

fn stream_event(event: &public::ChatStreamEvent) -> String {
    // Serializing plain strings can't fail
    serde_json::to_string(event).unwrap_or_default()
}

/// Start a new chat session with an empty transcript
async fn start_session(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let id = state
        .write()
        .map_err(|e| anyhow!("Unable to write shared state: {}", e))?
        .start_session();

    Ok((
        StatusCode::CREATED,
        axum::Json(public::ChatSessionCreated { id }),
    ))
}

/// Get the transcript of a chat session
async fn chat_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(session) = find_session(&state, &id)? else {
        return Ok(session_not_found(&id));
    };

    let transcript = session.lock().await.transcript().all().to_vec();

    Ok(axum::Json(public::ChatTranscriptResponse { transcript }).into_response())
}

/// Clear the transcript of a chat session
async fn clear_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(session) = find_session(&state, &id)? else {
        return Ok(session_not_found(&id));
    };

    session.lock().await.clear();

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// End a chat session and discard its transcript
async fn end_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let ended = state
        .write()
        .map_err(|e| anyhow!("Unable to write shared state: {}", e))?
        .end_session(&id);

    if !ended {
        return Ok(session_not_found(&id));
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Add a message to a chat session and stream the response
async fn chat_handler(
    State(state): State<SharedState>,
    axum::Json(payload): axum::Json<public::ChatRequest>,
) -> Result<Response, ApiError> {
    // Whitespace only counts as empty but the message is recorded as typed
    let message = payload.message;
    if message.trim().is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Message must not be empty").into_response());
    }

    let session_id = payload.session_id;
    let Some(session) = find_session(&state, &session_id)? else {
        return Ok(session_not_found(&session_id));
    };

    // Only one reply can be generated at a time per session
    let Ok(mut chat) = session.try_lock_owned() else {
        return Ok((
            StatusCode::CONFLICT,
            format!("Chat session {} is already waiting on a reply", session_id),
        )
            .into_response());
    };

    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let sse_stream = UnboundedReceiverStream::new(rx)
        .map(|chunk| Ok::<Event, Infallible>(Event::default().data(chunk)));

    // Get the next response. If the client goes away the reply is
    // still consumed in full and recorded so the transcript stays
    // consistent.
    tokio::spawn(async move {
        let reply = chat
            .next_msg(&message, |fragment| {
                let event = public::ChatStreamEvent::Fragment {
                    content: fragment.to_string(),
                };
                let _ = tx.send(stream_event(&event));
            })
            .await;

        // Release the session before signaling the client so a follow
        // up request never races with this one
        drop(chat);

        tracing::debug!("Chat session {} replied", session_id);

        let done = public::ChatStreamEvent::Done {
            done: true,
            reply: reply.text().to_string(),
        };
        let _ = tx.send(stream_event(&done));
    });

    let resp = Sse::new(sse_stream)
        .keep_alive(
            KeepAlive::default()
                .text("keep-alive")
                .interval(Duration::from_secs(15)),
        )
        .into_response();

    Ok(resp)
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(chat_handler))
        .route("/sessions", post(start_session))
        .route("/{id}", axum::routing::get(chat_session).delete(end_session))
        .route("/{id}/clear", post(clear_session))
}
