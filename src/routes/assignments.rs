use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::Result,
    middleware::auth::Claims,
    models::assignment::Assignment,
    services::assignment_service::ScoreSubmission,
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssignmentPayload {
    #[validate(email)]
    pub candidate_email: String,
    pub total_questions: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SelfAssignmentPayload {
    pub total_questions: Option<usize>,
}

/// Listing view of an assignment, without the question refs, violation
/// payloads or reference image.
#[derive(Debug, Serialize)]
pub struct AssignmentSummary {
    pub id: Uuid,
    pub candidate_email: String,
    pub assigned_by: String,
    pub total: i32,
    pub duration_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub expired: bool,
    pub terminated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    pub violations: i32,
}

impl From<&Assignment> for AssignmentSummary {
    fn from(a: &Assignment) -> Self {
        Self {
            id: a.id,
            candidate_email: a.candidate_email.clone(),
            assigned_by: a.assigned_by.clone(),
            total: a.total,
            duration_seconds: a.duration_seconds,
            created_at: a.created_at,
            started_at: a.started_at,
            finished_at: a.finished_at,
            expired: a.expired,
            terminated: a.terminated,
            percentage_score: a.percentage_score,
            passed: a.passed,
            violations: a.violations,
        }
    }
}

const DEFAULT_TOTAL: usize = 60;

#[axum::debug_handler]
pub async fn create_assignment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAssignmentPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let requester = claims.requester();
    let assignment = state
        .assignment_service
        .create_assignment(
            &payload.candidate_email,
            payload.total_questions.unwrap_or(DEFAULT_TOTAL),
            &requester,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(AssignmentSummary::from(&assignment))))
}

#[axum::debug_handler]
pub async fn create_own_assignment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SelfAssignmentPayload>,
) -> Result<impl IntoResponse> {
    let requester = claims.requester();
    let email = requester.email.clone();
    let assignment = state
        .assignment_service
        .create_assignment(
            &email,
            payload.total_questions.unwrap_or(DEFAULT_TOTAL),
            &requester,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(AssignmentSummary::from(&assignment))))
}

#[axum::debug_handler]
pub async fn list_assignments(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let assignments = state.assignment_service.list_all().await?;
    let summaries: Vec<AssignmentSummary> =
        assignments.iter().map(AssignmentSummary::from).collect();
    Ok(Json(summaries))
}

#[axum::debug_handler]
pub async fn my_assignments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let requester = claims.requester();
    let assignments = state
        .assignment_service
        .list_for_candidate(&requester.email)
        .await?;
    let summaries: Vec<AssignmentSummary> =
        assignments.iter().map(AssignmentSummary::from).collect();
    Ok(Json(summaries))
}

#[axum::debug_handler]
pub async fn get_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let requester = claims.requester();
    let exam = state
        .assignment_service
        .materialize_questions(id, &requester)
        .await?;
    Ok(Json(exam))
}

#[axum::debug_handler]
pub async fn get_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let requester = claims.requester();
    let status = state.assignment_service.get_status(id, &requester).await?;
    Ok(Json(status))
}

#[axum::debug_handler]
pub async fn submit_score(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ScoreSubmission>,
) -> Result<impl IntoResponse> {
    let requester = claims.requester();
    let outcome = state
        .assignment_service
        .submit_score(id, &requester, payload)
        .await?;
    Ok(Json(outcome))
}

/// Finished assignments with their outcomes, for the admin score board.
#[axum::debug_handler]
pub async fn list_scores(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let assignments = state.assignment_service.list_all().await?;
    let scored: Vec<AssignmentSummary> = assignments
        .iter()
        .filter(|a| a.finished_at.is_some() || a.terminated)
        .map(AssignmentSummary::from)
        .collect();
    Ok(Json(scored))
}

#[axum::debug_handler]
pub async fn get_attempts(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse> {
    let status = state
        .assignment_service
        .attempts_for(&email.trim().to_lowercase())
        .await?;
    Ok(Json(status))
}

#[axum::debug_handler]
pub async fn my_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let requester = claims.requester();
    let status = state.assignment_service.attempts_for(&requester.email).await?;
    Ok(Json(status))
}

#[axum::debug_handler]
pub async fn list_sections(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.bank.section_counts()))
}
