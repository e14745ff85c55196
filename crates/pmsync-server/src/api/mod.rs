//! Health and metrics endpoints

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::consumer::ConsumerOrchestrator;
use crate::db;
use crate::ingest::ProcessingCounters;

pub const SERVICE_NAME: &str = "pm-file-sync";

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub counters: Arc<ProcessingCounters>,
    pub orchestrator: Arc<ConsumerOrchestrator>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/metrics", get(metrics))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(tower_http::LatencyUnit::Micros),
                ),
        )
}

/// Service, database and consumer status with processing counters
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database_up = match db::health_check(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Database health check failed: {}", e);
            false
        },
    };

    let snapshot = state.counters.snapshot();
    let topics = state.orchestrator.active_topics();
    let status = if database_up { "UP" } else { "DOWN" };

    let body = json!({
        "status": status,
        "service": SERVICE_NAME,
        "timestamp": Utc::now().to_rfc3339(),
        "kafka": {
            "status": if topics.is_empty() { "DOWN" } else { "UP" },
            "activeTopics": topics,
            "totalMessagesProcessed": snapshot.total_messages_processed,
            "processingErrors": snapshot.processing_errors,
        },
        "database": status,
    });

    let code = if database_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.counters.snapshot())
}
