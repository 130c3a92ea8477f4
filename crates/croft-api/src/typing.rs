use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};

use croft_types::api::TypingRequest;
use croft_types::events::FeedEvent;
use croft_types::models::TypingIndicator;

use crate::internal;
use crate::middleware::CurrentFarmer;
use crate::state::AppState;

/// PUT /typing: upsert the caller's single typing-indicator row and
/// broadcast the change. Clients auto-clear after their quiet period; the
/// hub's sweeper catches any clear that never arrived.
pub async fn set_typing(
    State(state): State<AppState>,
    Extension(CurrentFarmer(current)): Extension<CurrentFarmer>,
    Json(req): Json<TypingRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let ts = croft_db::now_ts();

    let db = state.db.clone();
    let pid = current.id.to_string();
    let row_ts = ts.clone();
    tokio::task::spawn_blocking(move || db.upsert_typing(&pid, req.typing, &row_ts))
        .await
        .map_err(internal)?
        .map_err(internal)?;

    state.dispatcher.broadcast(FeedEvent::TypingUpdate {
        indicator: TypingIndicator {
            profile_id: current.id,
            display_name: current.display_name,
            typing: req.typing,
            updated_at: croft_db::models::parse_ts(&ts).map_err(internal)?,
        },
    });

    Ok(StatusCode::NO_CONTENT)
}
