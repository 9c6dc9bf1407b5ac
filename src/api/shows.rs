//! Show endpoints backed by the show queue

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ActionResponse, ApiError, ApiResult};
use crate::AppState;
use crate::common::Overview;
use crate::db::{EpisodeRecord, TvShowRecord};
use crate::queue::{AddShowOptions, ItemSnapshot, QueueError};

async fn load_show(state: &AppState, show_id: i64) -> Result<TvShowRecord, ApiError> {
    state
        .db
        .tv_shows()
        .get(show_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("show {}", show_id)))
}

async fn list_shows(State(state): State<AppState>) -> ApiResult<Vec<TvShowRecord>> {
    Ok(Json(state.db.tv_shows().list().await?))
}

#[derive(Debug, Serialize)]
pub struct EpisodeResponse {
    #[serde(flatten)]
    pub episode: EpisodeRecord,
    pub status_name: String,
    pub quality: String,
    pub overview: Overview,
}

#[derive(Debug, Serialize)]
pub struct ShowDetails {
    pub show: TvShowRecord,
    pub episodes: Vec<EpisodeResponse>,
}

async fn get_show(State(state): State<AppState>, Path(show_id): Path<i64>) -> ApiResult<ShowDetails> {
    let show = load_show(&state, show_id).await?;
    let episodes = state
        .db
        .episodes()
        .list_by_show(show_id)
        .await?
        .into_iter()
        .map(|episode| {
            let composite = episode.composite();
            EpisodeResponse {
                status_name: composite.status.to_string(),
                quality: composite.quality.to_string(),
                overview: show.quality.overview(composite),
                episode,
            }
        })
        .collect();

    Ok(Json(ShowDetails { show, episodes }))
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub id: Uuid,
}

async fn add_show(
    State(state): State<AppState>,
    Json(options): Json<AddShowOptions>,
) -> ApiResult<QueuedResponse> {
    if let Some(existing) = state.db.tv_shows().get_by_indexer_id(options.indexer_id).await? {
        return Err(QueueError::AlreadyExists(existing.id).into());
    }
    let id = state.show_queue.add_show(options)?;
    Ok(Json(QueuedResponse { id }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ForceQuery {
    #[serde(default)]
    pub force: bool,
}

async fn update_show(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    Query(query): Query<ForceQuery>,
) -> ApiResult<QueuedResponse> {
    let show = load_show(&state, show_id).await?;
    let id = state.show_queue.update_show(&show, query.force)?;
    Ok(Json(QueuedResponse { id }))
}

async fn refresh_show(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    Query(query): Query<ForceQuery>,
) -> ApiResult<ActionResponse> {
    let show = load_show(&state, show_id).await?;
    match state.show_queue.refresh_show(&show, query.force)? {
        Some(_) => Ok(Json(ActionResponse::ok())),
        None => Ok(Json(ActionResponse::with_message(
            "An update is already queued and will refresh the show",
        ))),
    }
}

async fn remove_show(State(state): State<AppState>, Path(show_id): Path<i64>) -> ApiResult<QueuedResponse> {
    let show = load_show(&state, show_id).await?;
    let id = state.show_queue.remove_show(&show)?;
    Ok(Json(QueuedResponse { id }))
}

#[derive(Debug, Deserialize)]
pub struct PauseRequest {
    pub paused: bool,
}

async fn pause_show(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    Json(body): Json<PauseRequest>,
) -> ApiResult<ActionResponse> {
    let show = load_show(&state, show_id).await?;
    state.db.tv_shows().set_paused(show.id, body.paused).await?;
    Ok(Json(ActionResponse::ok()))
}

#[derive(Debug, Serialize)]
pub struct ShowQueueStatus {
    pub current: Option<ItemSnapshot>,
    pub queued: Vec<ItemSnapshot>,
    /// Indexer IDs of shows still being added
    pub loading: Vec<i64>,
}

async fn queue_status(State(state): State<AppState>) -> Json<ShowQueueStatus> {
    Json(ShowQueueStatus {
        current: state.show_queue.current(),
        queued: state.show_queue.queued(),
        loading: state.show_queue.loading_shows(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shows", get(list_shows).post(add_show))
        .route("/shows/queue", get(queue_status))
        .route("/shows/{show_id}", get(get_show).delete(remove_show))
        .route("/shows/{show_id}/update", post(update_show))
        .route("/shows/{show_id}/refresh", post(refresh_show))
        .route("/shows/{show_id}/pause", post(pause_show))
}
