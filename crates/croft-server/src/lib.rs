pub mod sweeper;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use croft_api::middleware::require_farmer;
use croft_api::voice::VoiceStore;
use croft_api::{messages, profiles, typing, voice};
use croft_gateway::connection;
use croft_gateway::dispatcher::Dispatcher;

pub use croft_api::state::{AppState, AppStateInner};

/// Voice uploads are short clips; anything bigger is a client bug.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub async fn build_state(db_path: &Path, voice_dir: PathBuf) -> anyhow::Result<AppState> {
    let db = Arc::new(croft_db::Database::open(db_path)?);
    let dispatcher = Dispatcher::new();
    let voice = VoiceStore::new(voice_dir).await?;

    Ok(Arc::new(AppStateInner {
        db,
        dispatcher,
        voice,
    }))
}

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/profiles", post(profiles::ensure_profile))
        .route("/voice/{name}", get(voice::serve_voice))
        .route("/feed", get(ws_upgrade))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/profiles/online", get(profiles::online_profiles))
        .route("/profiles/{id}/presence", put(profiles::set_presence))
        .route("/messages", get(messages::list_messages))
        .route("/messages", post(messages::send_message))
        .route("/messages/{id}", patch(messages::edit_message))
        .route("/messages/{id}", delete(messages::delete_message))
        .route("/typing", put(typing::set_typing))
        .route("/voice/{name}", post(voice::upload_voice))
        .layer(middleware::from_fn_with_state(state.clone(), require_farmer))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_feed(socket, state.dispatcher.clone(), state.db.clone())
    })
}

async fn health() -> &'static str {
    "ok"
}
