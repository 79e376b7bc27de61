use axum::{
    extract::{rejection::QueryRejection, Json, Path, Query, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::{
    models::{ActionKind, Actor, BountyListing, BountySnapshot},
    projector::Page,
    utils::parse_address,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/:address", get(show))
        .route("/:address/actions", get(actions))
}

/// One page of bounties in factory order
pub async fn list(
    State(state): State<AppState>,
    page: Result<Query<Page>, QueryRejection>,
) -> Result<Json<Vec<BountyListing>>, ApiError> {
    let Query(page) = page?;
    let listing = state.projector.list(page).await?;
    Ok(Json(listing))
}

pub async fn show(State(state): State<AppState>, Path(address): Path<String>) -> Result<Json<BountySnapshot>, ApiError> {
    let address = parse_address(&address)?;
    let snapshot = state.projector.bounty(address).await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct ActionsQuery {
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct ActorActions {
    #[serde(flatten)]
    pub actor: Actor,
    pub available: Vec<ActionKind>,
}

/// What `user` may do on this bounty right now
pub async fn actions(
    State(state): State<AppState>,
    Path(address): Path<String>,
    query: Result<Query<ActionsQuery>, QueryRejection>,
) -> Result<Json<ActorActions>, ApiError> {
    let Query(query) = query?;
    let address = parse_address(&address)?;
    let user = parse_address(&query.user)?;

    let (snapshot, now) = tokio::try_join!(
        state.projector.bounty_onchain(address),
        state.chain.block_timestamp()
    )?;
    let actor = state.projector.actor(&snapshot, user).await?;
    let available = state.gate.available(&snapshot, &actor, now);

    Ok(Json(ActorActions { actor, available }))
}
