pub mod attempts;
pub mod health;
pub mod reports;

use axum::{routing::get, Router};

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/attempts",
            get(attempts::list_attempts).post(attempts::submit_attempt),
        )
        .route("/api/tests/:test_id/leaderboard", get(reports::leaderboard))
        .route("/api/stats", get(reports::stats))
        .route("/api/toppers", get(reports::list_toppers))
        .route(
            "/api/participants/:participant_id/summary",
            get(reports::get_participant_summary),
        )
        .with_state(state)
}
