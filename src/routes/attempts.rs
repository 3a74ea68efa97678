use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use validator::Validate;

use crate::{
    dto::attempt_dto::{AttemptQuery, SubmitAttemptResponse},
    error::Result,
    models::test_attempt::TestAttempt,
    services::record_store::{AppendOutcome, AttemptFilter},
    AppState,
};

/// Accepts a finished attempt. Re-sending the same attempt id is
/// acknowledged with `duplicate: true` so queued clients can retry freely.
#[axum::debug_handler]
pub async fn submit_attempt(
    State(state): State<AppState>,
    Json(attempt): Json<TestAttempt>,
) -> Result<impl IntoResponse> {
    attempt.validate()?;
    let attempt_id = attempt.id;
    let outcome = state.record_store.append(attempt).await?;
    let status = match outcome {
        AppendOutcome::Inserted => StatusCode::CREATED,
        AppendOutcome::Duplicate => StatusCode::OK,
    };
    Ok((
        status,
        Json(SubmitAttemptResponse {
            attempt_id,
            duplicate: outcome == AppendOutcome::Duplicate,
        }),
    ))
}

#[axum::debug_handler]
pub async fn list_attempts(
    State(state): State<AppState>,
    Query(query): Query<AttemptQuery>,
) -> Result<impl IntoResponse> {
    let filter = AttemptFilter::from(query);
    let attempts = state.record_store.list(&filter).await?;
    Ok(Json(attempts))
}
