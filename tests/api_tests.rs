//! HTTP API tests driven through the router without a listening socket

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::*;
use medusa::AppState;
use medusa::app::build_app;
use medusa::clients::DownloadClients;
use medusa::config::{Config, Settings};
use medusa::db::Database;
use medusa::indexer::ProviderRegistry;
use medusa::services::{EpisodeMetadata, MetadataSource, NotificationService, ShowMetadata};

struct NoMetadata;

#[async_trait]
impl MetadataSource for NoMetadata {
    async fn get_show(&self, indexer_id: i64) -> Result<ShowMetadata> {
        bail!("unknown show {}", indexer_id)
    }

    async fn get_episodes(&self, _indexer_id: i64) -> Result<Vec<EpisodeMetadata>> {
        Ok(Vec::new())
    }
}

async fn app() -> (Router, Database) {
    let db = Database::in_memory().await.unwrap();
    let config = Config {
        host: None,
        port: 0,
        database_path: PathBuf::from(":memory:"),
        settings_path: PathBuf::from("settings.yaml"),
        data_path: PathBuf::from("."),
        tvmaze_url: "http://localhost".to_string(),
    };
    let client = Arc::new(RecordingClient::default());
    let state = AppState::new(
        Arc::new(config),
        Arc::new(Settings::default()),
        db.clone(),
        ProviderRegistry::new(false),
        DownloadClients::new(client.clone(), client),
        Arc::new(NoMetadata),
        Arc::new(NotificationService::new()),
    );
    (build_app(state), db)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_healthz() {
    let (app, _) = app().await;
    let (status, body) = send(&app, Method::GET, "/healthz", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_readyz_reports_database() {
    let (app, _) = app().await;
    let (status, body) = send(&app, Method::GET, "/readyz", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], true);
    assert_eq!(body["providers"], 0);
}

#[tokio::test]
async fn test_backlog_pause_round_trip() {
    let (app, _) = app().await;

    let (status, _) = send(&app, Method::POST, "/api/search/backlog/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app, Method::GET, "/api/search/queue", None).await;
    assert_eq!(body["backlog_paused"], true);

    send(&app, Method::POST, "/api/search/backlog/unpause", None).await;
    let (_, body) = send(&app, Method::GET, "/api/search/queue", None).await;
    assert_eq!(body["backlog_paused"], false);
}

#[tokio::test]
async fn test_manual_search_unknown_show_is_not_found() {
    let (app, _) = app().await;
    let (status, body) = send(&app, Method::POST, "/api/shows/42/episodes/1/1/search", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("show 42"));
}

#[tokio::test]
async fn test_manual_search_is_queued_once() {
    let (app, db) = app().await;
    let show = add_show(&db, "Show Name", tv_profile()).await;
    add_episode(&db, &show, 1, 1, aired(), wanted()).await;
    let uri = format!("/api/shows/{}/episodes/1/1/search", show.id);

    let (status, body) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // Nothing drains the queue here, so the first search is still waiting
    let (status, _) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(&app, Method::GET, &format!("/api/shows/{}/search/status", show.id), None).await;
    assert_eq!(body[0]["state"], "queued");
    assert_eq!(body[0]["search_type"], "manual");
    assert_eq!(body[0]["status"], "Wanted");
}

#[tokio::test]
async fn test_adding_a_known_show_conflicts() {
    let (app, db) = app().await;
    add_show(&db, "Show Name", tv_profile()).await;

    let (status, _) = send(&app, Method::POST, "/api/shows", Some(json!({ "indexer_id": 100 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, Method::POST, "/api/shows", Some(json!({ "indexer_id": 200 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["id"].is_string());
}
