use axum::{
    extract::{Json, Path, State},
    routing::get,
    Router,
};

use super::ApiError;
use crate::{projector::UserBounties, utils::parse_address, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/:address/bounties", get(bounties))
}

/// Bounties the address has staked in or claimed
pub async fn bounties(State(state): State<AppState>, Path(address): Path<String>) -> Result<Json<UserBounties>, ApiError> {
    let user = parse_address(&address)?;
    let found = state.projector.user_bounties(user).await?;
    Ok(Json(found))
}
