//! UI notification endpoints

use axum::{Json, Router, extract::State, routing::get};

use crate::AppState;
use crate::services::UiNotification;

/// Pending UI messages; reading them clears the list
async fn take_notifications(State(state): State<AppState>) -> Json<Vec<UiNotification>> {
    Json(state.notifications.drain())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/notifications", get(take_notifications))
}
