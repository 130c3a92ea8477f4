use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use croft_db::queries::NewMessage;
use croft_types::api::{validate_content, EditMessageRequest, SendMessageRequest};
use croft_types::events::FeedEvent;
use croft_types::models::ChatMessage;

use crate::internal;
use crate::middleware::CurrentFarmer;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// GET /messages: one page, newest first. Clients that want display order
/// reverse the page locally.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let limit = query.limit.min(200);
    let offset = query.offset;

    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.get_messages(limit, offset))
        .await
        .map_err(internal)?
        .map_err(internal)?;

    let messages: Vec<ChatMessage> = rows
        .into_iter()
        .filter_map(|row| match row.into_message() {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("skipping corrupt message row: {}", e);
                None
            }
        })
        .collect();

    Ok(Json(messages))
}

/// POST /messages: validated insert, then broadcast. The persisted row
/// (server-assigned id and timestamps) is returned to the sender.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(CurrentFarmer(current)): Extension<CurrentFarmer>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let message_id = Uuid::new_v4();
    let ts = croft_db::now_ts();

    let (kind, content, voice_url, voice_duration_secs, reply_to) = match &req {
        SendMessageRequest::Text { content, reply_to } => {
            validate_content(content).map_err(|e| {
                warn!("rejected message from {}: {}", current.id, e);
                StatusCode::BAD_REQUEST
            })?;
            ("text", Some(content.clone()), None, None, *reply_to)
        }
        SendMessageRequest::Voice {
            voice_url,
            voice_duration_secs,
            reply_to,
        } => {
            if voice_url.is_empty() || !voice_duration_secs.is_finite() || *voice_duration_secs <= 0.0 {
                return Err(StatusCode::BAD_REQUEST);
            }
            ("voice", None, Some(voice_url.clone()), Some(*voice_duration_secs), *reply_to)
        }
    };

    // A dangling reply_to is a caller error, not a server one
    if let Some(parent) = reply_to {
        let db = state.db.clone();
        let parent_id = parent.to_string();
        let exists = tokio::task::spawn_blocking(move || db.get_message(&parent_id))
            .await
            .map_err(internal)?
            .map_err(internal)?
            .is_some();
        if !exists {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    let db = state.db.clone();
    let mid = message_id.to_string();
    let pid = current.id.to_string();
    let row_ts = ts.clone();
    tokio::task::spawn_blocking(move || {
        db.insert_message(&NewMessage {
            id: &mid,
            profile_id: &pid,
            kind,
            content: content.as_deref(),
            voice_url: voice_url.as_deref(),
            voice_duration_secs,
            reply_to: reply_to.map(|r| r.to_string()).as_deref(),
            created_at: &row_ts,
        })
    })
    .await
    .map_err(internal)?
    .map_err(internal)?;

    let message = fetch_message(&state, message_id).await?;

    state.dispatcher.broadcast(FeedEvent::MessageCreate {
        message: message.clone(),
    });

    Ok((StatusCode::CREATED, Json(message)))
}

/// PATCH /messages/{id}: edit own message text. Ownership lives in the SQL
/// predicate: zero rows affected means "missing or not yours", and we answer
/// 404 without distinguishing.
pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(CurrentFarmer(current)): Extension<CurrentFarmer>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    validate_content(&req.content).map_err(|_| StatusCode::BAD_REQUEST)?;

    let db = state.db.clone();
    let mid = message_id.to_string();
    let pid = current.id.to_string();
    let affected =
        tokio::task::spawn_blocking(move || db.edit_message(&mid, &pid, &req.content, &croft_db::now_ts()))
            .await
            .map_err(internal)?
            .map_err(internal)?;

    if affected == 0 {
        return Err(StatusCode::NOT_FOUND);
    }

    let message = fetch_message(&state, message_id).await?;

    state.dispatcher.broadcast(FeedEvent::MessageUpdate {
        message: message.clone(),
    });

    Ok(Json(message))
}

/// DELETE /messages/{id}: hard delete of own message, same 404 contract as
/// edit.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(CurrentFarmer(current)): Extension<CurrentFarmer>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let mid = message_id.to_string();
    let pid = current.id.to_string();
    let affected = tokio::task::spawn_blocking(move || db.delete_message(&mid, &pid))
        .await
        .map_err(internal)?
        .map_err(internal)?;

    if affected == 0 {
        return Err(StatusCode::NOT_FOUND);
    }

    state.dispatcher.broadcast(FeedEvent::MessageDelete { message_id });

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_message(state: &AppState, id: Uuid) -> Result<ChatMessage, StatusCode> {
    let db = state.db.clone();
    let mid = id.to_string();
    let row = tokio::task::spawn_blocking(move || db.get_message(&mid))
        .await
        .map_err(internal)?
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    row.into_message().map_err(internal)
}
