use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};

use crate::{
    dto::attempt_dto::{LeaderboardResponse, WindowQuery},
    error::{Error, Result},
    services::{
        aggregation_service::{participant_summary, test_summary, toppers, window_stats},
        ranking_service::rank_attempts,
        record_store::AttemptFilter,
    },
    utils::time::now,
    AppState,
};

#[axum::debug_handler]
pub async fn leaderboard(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<impl IntoResponse> {
    let attempts = state.record_store.list(&AttemptFilter::for_test(&test_id)).await?;
    let entries = rank_attempts(&attempts);
    let summary = test_summary(&attempts, &test_id);
    Ok(Json(LeaderboardResponse {
        test_id,
        entries,
        summary,
    }))
}

#[axum::debug_handler]
pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<impl IntoResponse> {
    let attempts = state.record_store.list(&AttemptFilter::default()).await?;
    let local_now = now().with_timezone(&state.report_offset);
    Ok(Json(window_stats(&attempts, query.window, local_now)))
}

#[axum::debug_handler]
pub async fn list_toppers(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<impl IntoResponse> {
    let attempts = state.record_store.list(&AttemptFilter::default()).await?;
    let local_now = now().with_timezone(&state.report_offset);
    Ok(Json(toppers(&attempts, query.window, local_now)))
}

#[axum::debug_handler]
pub async fn get_participant_summary(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Result<impl IntoResponse> {
    let attempts = state
        .record_store
        .list(&AttemptFilter::for_participant(&participant_id))
        .await?;
    if attempts.is_empty() {
        return Err(Error::NotFound(format!(
            "No attempts recorded for participant {}",
            participant_id
        )));
    }
    Ok(Json(participant_summary(&attempts, &participant_id)))
}
