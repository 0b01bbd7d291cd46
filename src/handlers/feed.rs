use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    Extension,
};
use serde_json::{json, Value};

use crate::{
    dtos::order_dtos::{FeedItem, FeedQuery, RecordActivityRequest},
    errors::Result,
    extractors::{ApiJson, ApiQuery},
    models::user::AuthUser,
    state::AppState,
};

pub async fn product_feed(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
    ApiQuery(query): ApiQuery<FeedQuery>,
) -> Result<Json<Value>> {
    let user_id = user.map(|Extension(user)| user.id);
    let items: Vec<FeedItem> = state
        .feed
        .feed(user_id, query.limit())
        .await?
        .into_iter()
        .map(FeedItem::from)
        .collect();

    Ok(Json(json!({
        "success": true,
        "count": items.len(),
        "data": items,
    })))
}

pub async fn record_activity(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<RecordActivityRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let activity = state.feed.record(user.id, payload.into_activity()?).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": {
                "type": activity.kind,
                "product_id": activity.product_id.map(|id| id.to_hex()),
                "category": activity.category,
                "weight": activity.weight,
            },
        })),
    ))
}
