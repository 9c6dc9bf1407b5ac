//! Search queue endpoints

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::{ActionResponse, ApiError, ApiResult};
use crate::AppState;
use crate::common::EpisodeKey;
use crate::jobs::{daily_search, proper_finder};
use crate::queue::{ItemSnapshot, ManualSearchState, QueueLength, SearchKind};

#[derive(Debug, Serialize)]
pub struct SearchQueueStatus {
    pub current: Option<ItemSnapshot>,
    pub queued: Vec<ItemSnapshot>,
    pub length: QueueLength,
    pub backlog_paused: bool,
    pub backlog_running: bool,
    pub backlog_in_progress: bool,
    pub daily_in_progress: bool,
    pub manual_in_progress: bool,
}

async fn queue_status(State(state): State<AppState>) -> Json<SearchQueueStatus> {
    let queue = &state.search_queue;
    Json(SearchQueueStatus {
        current: queue.current(),
        queued: queue.queued(),
        length: queue.queue_length(),
        backlog_paused: queue.is_backlog_paused(),
        backlog_running: state.backlog.is_active(),
        backlog_in_progress: queue.is_backlog_in_progress(),
        daily_in_progress: queue.is_dailysearch_in_progress(),
        manual_in_progress: queue.is_manualsearch_in_progress(),
    })
}

async fn pause_backlog(State(state): State<AppState>) -> Json<ActionResponse> {
    state.search_queue.pause_backlog();
    Json(ActionResponse::ok())
}

async fn unpause_backlog(State(state): State<AppState>) -> Json<ActionResponse> {
    state.search_queue.unpause_backlog();
    Json(ActionResponse::ok())
}

async fn force_daily(State(state): State<AppState>) -> ApiResult<ActionResponse> {
    let aired = daily_search::run_daily_search(&state.db, &state.search_queue).await?;
    Ok(Json(ActionResponse::with_message(format!(
        "Daily search queued, {} newly aired episodes",
        aired
    ))))
}

async fn force_backlog(State(state): State<AppState>) -> ApiResult<ActionResponse> {
    let queued = state
        .backlog
        .search_backlog(&state.db, &state.search_queue, true)
        .await?;
    Ok(Json(ActionResponse::with_message(format!(
        "Queued {} backlog segments",
        queued
    ))))
}

async fn force_propers(State(state): State<AppState>) -> ApiResult<ActionResponse> {
    proper_finder::queue_proper_search(&state.search_queue)?;
    Ok(Json(ActionResponse::ok()))
}

#[derive(Debug, Default, Deserialize)]
pub struct ManualSearchQuery {
    /// Also accept a release in the quality the episode already has
    #[serde(default)]
    pub down_cur_quality: bool,
}

async fn manual_search(
    State(state): State<AppState>,
    Path((show_id, season, episode)): Path<(i64, i32, i32)>,
    Query(query): Query<ManualSearchQuery>,
) -> ApiResult<ActionResponse> {
    let show = state
        .db
        .tv_shows()
        .get(show_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("show {}", show_id)))?;
    let key = EpisodeKey::new(season, episode);
    let episode = state
        .db
        .episodes()
        .get(show_id, key)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("episode {}", key)))?;

    state.search_queue.add_item(SearchKind::Manual {
        show,
        episode,
        down_cur_quality: query.down_cur_quality,
    })?;
    Ok(Json(ActionResponse::ok()))
}

async fn retry_episode(
    State(state): State<AppState>,
    Path((show_id, season, episode)): Path<(i64, i32, i32)>,
) -> ApiResult<ActionResponse> {
    let show = state
        .db
        .tv_shows()
        .get(show_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("show {}", show_id)))?;
    let key = EpisodeKey::new(season, episode);
    let episode = state
        .db
        .episodes()
        .get(show_id, key)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("episode {}", key)))?;

    state.search_queue.add_item(SearchKind::Failed {
        show,
        segment: vec![episode],
    })?;
    Ok(Json(ActionResponse::ok()))
}

/// One episode of a manual or failed search, with its current status
#[derive(Debug, Serialize)]
pub struct EpisodeSearchStatus {
    pub season: i32,
    pub episode: i32,
    pub search_type: &'static str,
    pub state: ManualSearchState,
    pub success: Option<bool>,
    pub status: String,
    pub quality: String,
}

async fn manual_search_status(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> ApiResult<Vec<EpisodeSearchStatus>> {
    let mut statuses = Vec::new();

    for entry in state.search_queue.manual_search_status(show_id) {
        for key in &entry.episodes {
            let Some(record) = state.db.episodes().get(show_id, *key).await? else {
                continue;
            };
            let composite = record.composite();
            statuses.push(EpisodeSearchStatus {
                season: key.season,
                episode: key.episode,
                search_type: entry.search_type,
                state: entry.state,
                success: entry.success,
                status: composite.status.to_string(),
                quality: composite.quality.to_string(),
            });
        }
    }

    Ok(Json(statuses))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search/queue", get(queue_status))
        .route("/search/backlog/pause", post(pause_backlog))
        .route("/search/backlog/unpause", post(unpause_backlog))
        .route("/search/daily", post(force_daily))
        .route("/search/backlog", post(force_backlog))
        .route("/search/propers", post(force_propers))
        .route(
            "/shows/{show_id}/episodes/{season}/{episode}/search",
            post(manual_search),
        )
        .route(
            "/shows/{show_id}/episodes/{season}/{episode}/retry",
            post(retry_episode),
        )
        .route("/shows/{show_id}/search/status", get(manual_search_status))
}
