//! Small read-only status surface: liveness plus a view of what is about to be announced.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    /// Receipts are looked up for this destination.
    pub destination_id: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/debug/upcoming", get(debug_upcoming))
        .with_state(state)
}

#[derive(Serialize)]
struct UpcomingOut {
    id: String,
    home_team: String,
    away_team: String,
    start_time_utc: DateTime<Utc>,
    source: String,
    url: Option<String>,
    notified: bool,
}

/// Matches starting within the next 24 hours.
async fn debug_upcoming(
    State(state): State<AppState>,
) -> Result<Json<Vec<UpcomingOut>>, (StatusCode, String)> {
    let now = Utc::now();
    let rows = state
        .store
        .matches_between(now, now + Duration::hours(24))
        .map_err(internal)?;

    let mut out = Vec::with_capacity(rows.len());
    for m in rows {
        let notified = state
            .store
            .is_notified(&m.id, &state.destination_id)
            .map_err(internal)?;
        out.push(UpcomingOut {
            id: m.id,
            home_team: m.home_team,
            away_team: m.away_team,
            start_time_utc: m.start_time_utc,
            source: m.source,
            url: m.url,
            notified,
        });
    }
    Ok(Json(out))
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(target: "store", error = %format!("{e:#}"), "status query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable".to_string())
}
