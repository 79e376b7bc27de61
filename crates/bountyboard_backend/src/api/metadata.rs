//! Pinning proxy: pins new metadata documents and serves pinned ones through
//! a short-lived read-through cache of its own.

use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    routing::{get, post},
    Router,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ApiError;
use crate::{error::ValidationError, metadata::normalize_cid, AppState};

/// Fields every pinned bounty document must carry
const REQUIRED_FIELDS: [&str; 2] = ["title", "description"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(pin))
        .route("/:cid", get(fetch))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinResponse {
    pub cid: String,
}

/// Pin a metadata document, extra fields are passed through untouched
pub async fn pin(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PinResponse>, ApiError> {
    let Json(document) = payload?;
    for field in REQUIRED_FIELDS {
        match document.get(field).and_then(Value::as_str) {
            Some(v) if !v.trim().is_empty() => {},
            _ => return Err(ValidationError::MissingField(field).into()),
        }
    }

    let cid = state.pinner.pin_json(&document).await?;
    info!("pinned metadata as {cid}");

    // a freshly pinned document may not have propagated to gateways yet
    state.proxy_cache.insert(cid.clone(), document).await;

    Ok(Json(PinResponse { cid }))
}

pub async fn fetch(State(state): State<AppState>, Path(cid): Path<String>) -> Result<Json<Value>, ApiError> {
    let cid = normalize_cid(&cid)?;

    if let Some(document) = state.proxy_cache.get(&cid).await {
        debug!("proxy cache hit {cid}");
        return Ok(Json(document));
    }

    let document = state.resolver.fetch(&cid).await?;
    state.proxy_cache.insert(cid, document.clone()).await;
    Ok(Json(document))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::FromRequest,
        http::{header, Request, StatusCode},
        response::IntoResponse,
    };
    use serde_json::json;

    use super::*;
    use crate::tests::{fixture_state, offline_state};

    #[tokio::test]
    async fn test_pin_then_fetch() {
        let state = fixture_state();
        let document = json!({
            "title": "Port the indexer",
            "description": "Rewrite the indexer against the new event schema.",
            "external_url": "https://github.com/example/indexer"
        });

        let Json(pinned) = pin(State(state.clone()), Ok(Json(document.clone()))).await.unwrap();
        let Json(again) = pin(State(state.clone()), Ok(Json(document.clone()))).await.unwrap();
        assert_eq!(pinned.cid, again.cid);

        let Json(fetched) = fetch(State(state.clone()), Path(format!("ipfs://{}", pinned.cid)))
            .await
            .unwrap();
        assert_eq!(fetched, document);
    }

    #[tokio::test]
    async fn test_pin_missing_field() {
        let state = fixture_state();

        let err = pin(State(state.clone()), Ok(Json(json!({ "title": "No description" }))))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("description"));

        let err = pin(State(state), Ok(Json(json!(["not", "an", "object"]))))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_fetch_pinned_fixture() {
        let state = fixture_state();
        let Json(doc) = fetch(State(state), Path("bafkreibridgeaudit".into())).await.unwrap();
        assert_eq!(doc["title"], "Audit the bridge withdrawal flow");
    }

    #[tokio::test]
    async fn test_fetch_errors() {
        let state = fixture_state();

        let err = fetch(State(state.clone()), Path("not a cid!".into())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = fetch(State(state), Path("bafkreinotpinnedanywhere".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_pin_without_jwt() {
        let state = offline_state();
        let err = pin(
            State(state),
            Ok(Json(json!({ "title": "t", "description": "d" }))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("PINATA_JWT"));
    }

    async fn rejected(request: Request<Body>) -> JsonRejection {
        Json::<Value>::from_request(request, &()).await.unwrap_err()
    }

    #[tokio::test]
    async fn test_pin_rejected_body() {
        let state = fixture_state();

        let malformed = Request::post("/metadata")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let err = pin(State(state.clone()), Err(rejected(malformed).await))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let plain = Request::post("/metadata")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("title=x"))
            .unwrap();
        let err = pin(State(state), Err(rejected(plain).await)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let response = err.into_response();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }
}
