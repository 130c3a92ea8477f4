use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use tracing::info;
use uuid::Uuid;

use croft_db::queries::NewMessage;
use croft_types::api::{EnsureProfileRequest, PresenceRequest};
use croft_types::events::FeedEvent;
use croft_types::models::FarmerProfile;

use crate::internal;
use crate::middleware::CurrentFarmer;
use crate::state::AppState;

/// POST /profiles: look up or create the profile for a farmer id.
/// First-time farmers get a system join notice on the message feed.
pub async fn ensure_profile(
    State(state): State<AppState>,
    Json(req): Json<EnsureProfileRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let farmer_id = req.farmer_id.trim().to_string();
    if farmer_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let (row, created) = tokio::task::spawn_blocking(move || db.ensure_profile(&farmer_id))
        .await
        .map_err(internal)?
        .map_err(internal)?;

    let profile = row.into_profile().map_err(internal)?;

    if created {
        info!("created profile {} ({})", profile.display_name, profile.id);
        post_join_notice(&state, &profile).await?;
    }

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(profile)))
}

/// PUT /profiles/{id}/presence: set the online flag and refresh last_seen.
/// A farmer may only set their own presence.
pub async fn set_presence(
    State(state): State<AppState>,
    Path(profile_id): Path<Uuid>,
    Extension(CurrentFarmer(current)): Extension<CurrentFarmer>,
    Json(req): Json<PresenceRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if profile_id != current.id {
        return Err(StatusCode::FORBIDDEN);
    }

    let db = state.db.clone();
    let pid = profile_id.to_string();
    let row = tokio::task::spawn_blocking(move || db.set_presence(&pid, req.online, &croft_db::now_ts()))
        .await
        .map_err(internal)?
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let profile = row.into_profile().map_err(internal)?;

    state.dispatcher.broadcast(FeedEvent::PresenceUpdate {
        profile: profile.clone(),
    });

    Ok(Json(profile))
}

/// GET /profiles/online: online farmers, most-recently-seen first.
pub async fn online_profiles(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.online_profiles())
        .await
        .map_err(internal)?
        .map_err(internal)?;

    let profiles: Vec<FarmerProfile> = rows
        .into_iter()
        .filter_map(|row| match row.into_profile() {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!("skipping corrupt profile row: {}", e);
                None
            }
        })
        .collect();

    Ok(Json(profiles))
}

async fn post_join_notice(state: &AppState, profile: &FarmerProfile) -> Result<(), StatusCode> {
    let message_id = Uuid::new_v4().to_string();
    let ts = croft_db::now_ts();
    let content = format!("{} joined the community", profile.display_name);

    let db = state.db.clone();
    let pid = profile.id.to_string();
    let mid = message_id.clone();
    let notice_ts = ts.clone();
    let notice = content.clone();
    tokio::task::spawn_blocking(move || {
        db.insert_message(&NewMessage {
            id: &mid,
            profile_id: &pid,
            kind: "system",
            content: Some(&notice),
            voice_url: None,
            voice_duration_secs: None,
            reply_to: None,
            created_at: &notice_ts,
        })
    })
    .await
    .map_err(internal)?
    .map_err(internal)?;

    state.dispatcher.broadcast(FeedEvent::MessageCreate {
        message: croft_types::models::ChatMessage {
            id: message_id.parse().map_err(internal)?,
            profile_id: profile.id,
            author_name: profile.display_name.clone(),
            kind: croft_types::models::MessageKind::System,
            content: Some(content),
            voice_url: None,
            voice_duration_secs: None,
            reply_to: None,
            edited: false,
            created_at: croft_db::models::parse_ts(&ts).map_err(internal)?,
            updated_at: croft_db::models::parse_ts(&ts).map_err(internal)?,
        },
    });

    Ok(())
}
