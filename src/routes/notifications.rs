use axum::{
    extract::State,
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::json;

use crate::{error::Result, middleware::auth::Claims, AppState};

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let requester = claims.requester();
    let notifications = state.notification_service.list_for(&requester.email).await?;
    Ok(Json(notifications))
}

#[axum::debug_handler]
pub async fn mark_notifications_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let requester = claims.requester();
    state
        .notification_service
        .mark_all_read(&requester.email)
        .await?;
    Ok(Json(json!({"status": "ok"})))
}
