//! Application state and HTTP router construction.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::clients::DownloadClients;
use crate::config::{Config, Settings};
use crate::db::Database;
use crate::indexer::ProviderRegistry;
use crate::jobs::BacklogSearcher;
use crate::queue::{SearchQueue, ShowQueue, ShowQueueContext};
use crate::search::SearchContext;
use crate::services::{MetadataSource, NotificationService};

/// Shared state for HTTP handlers and scheduled jobs
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: Arc<Settings>,
    pub db: Database,
    pub search_queue: Arc<SearchQueue>,
    pub show_queue: Arc<ShowQueue>,
    pub backlog: Arc<BacklogSearcher>,
    pub notifications: Arc<NotificationService>,
}

impl AppState {
    /// Wire the queues together
    pub fn new(
        config: Arc<Config>,
        settings: Arc<Settings>,
        db: Database,
        providers: ProviderRegistry,
        clients: DownloadClients,
        metadata: Arc<dyn MetadataSource>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        let search_ctx = SearchContext {
            db: db.clone(),
            providers,
            clients,
            notifications: notifications.clone(),
            settings: settings.search.clone(),
        };
        let search_queue = Arc::new(SearchQueue::new(Arc::new(search_ctx)));

        let show_queue = Arc::new(ShowQueue::new(Arc::new(ShowQueueContext {
            db: db.clone(),
            metadata,
            search_queue: search_queue.clone(),
            notifications: notifications.clone(),
        })));

        let backlog = Arc::new(BacklogSearcher::new(
            settings.search.backlog_days,
            settings.search.backlog_cycle_days,
        ));

        Self {
            config,
            settings,
            db,
            search_queue,
            show_queue,
            backlog,
            notifications,
        }
    }
}

/// Build the full Axum router: health checks at the root, everything else
/// under `/api`.
pub fn build_app(state: AppState) -> Router<()> {
    Router::new()
        .merge(api::health::router())
        .nest("/api", api::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
