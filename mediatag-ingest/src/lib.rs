//! mediatag-ingest library interface
//!
//! Exposes the pipeline, its collaborators and the HTTP intake for the binary
//! and for integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod types;

pub use crate::error::{ApiError, ApiResult, PipelineError, PipelineResult};
pub use crate::pipeline::{InvocationOutcome, Pipeline, PipelineConfig};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Pipeline holding the process-wide client handles
    pub pipeline: Arc<Pipeline>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last failed invocation, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::event_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
