//! Manual-trigger HTTP API for the dashboard: due-check and force-update
//! endpoints plus read access to all stored values.

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::FeedError;
use crate::store::Store;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub dispatcher: Arc<Dispatcher>,
}

pub struct ApiServer {
    addr: String,
    state: AppState,
}

impl ApiServer {
    pub fn new(addr: String, state: AppState) -> Self {
        Self { addr, state }
    }

    pub async fn start(self) -> Result<(), FeedError> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("listening on {}", self.addr);
        axum::serve(listener, app).await?;
        Ok(())
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/api/checkFeeds", post(check_all_feeds))
            .route("/api/checkFeed/:name", post(check_feed))
            .route("/api/updateFeed/:name", post(update_feed))
            .route("/api/values", get(values))
            .with_state(self.state.clone())
    }
}

/// Forces an immediate due-check of every feed; failures are logged per feed
/// and never fail the request.
async fn check_all_feeds(State(state): State<AppState>) -> StatusCode {
    state.dispatcher.check_all().await;
    StatusCode::OK
}

/// Forces an immediate due-check of one feed.
async fn check_feed(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    match state.dispatcher.check_feed(&name).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(FeedError::FeedNotFound(name)) => {
            error!("feed not found: '{}'", name);
            Err((StatusCode::NOT_FOUND, format!("feed not found: '{name}'")))
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unable to check feed: {e}"),
        )),
    }
}

/// Forces an immediate fetch + store of one feed, bypassing the due-check.
async fn update_feed(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    match state.dispatcher.update_feed(&name).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(FeedError::FeedNotFound(name)) => {
            error!("feed not found: '{}'", name);
            Err((StatusCode::NOT_FOUND, format!("feed not found: '{name}'")))
        }
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unable to update feed: {e}"),
        )),
    }
}

/// All stored values, shaped feed name -> mapping name -> scalar-or-list.
async fn values(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, String)> {
    match state.store.read_all(&state.config).await {
        Ok(data) => Ok(Json(serde_json::to_value(data).unwrap_or(Value::Null))),
        Err(e) => {
            error!("unable to get data: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "unable to get data".to_string(),
            ))
        }
    }
}
