use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use croft_types::models::FarmerProfile;

use crate::internal;
use crate::state::AppState;

/// Identity is the caller-supplied farmer id; there is no password/OTP
/// flow at this layer.
pub use croft_types::api::FARMER_ID_HEADER;

/// The resolved profile of the calling farmer, stashed in request
/// extensions by [`require_farmer`].
#[derive(Debug, Clone)]
pub struct CurrentFarmer(pub FarmerProfile);

/// Resolve `x-farmer-id` to an existing profile. Unknown farmers get 401;
/// they must ensure a profile first via `POST /profiles`.
pub async fn require_farmer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let farmer_id = req
        .headers()
        .get(FARMER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    let db = state.db.clone();
    let row = tokio::task::spawn_blocking(move || db.get_profile_by_farmer_id(&farmer_id))
        .await
        .map_err(internal)?
        .map_err(internal)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let profile = row.into_profile().map_err(internal)?;

    req.extensions_mut().insert(CurrentFarmer(profile));
    Ok(next.run(req).await)
}
