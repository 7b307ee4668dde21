use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    middleware::auth::Claims,
    models::assignment::ViolationKind,
    services::proctoring_service::FrameAlert,
    vision,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct FramePayload {
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct ViolationPayload {
    pub kind: ViolationKind,
    pub message: String,
    #[serde(default)]
    pub captured_image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FrameResponse {
    pub alerts: Vec<FrameAlert>,
    pub violations: i32,
    pub terminated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_message: Option<String>,
}

/// Accepts one webcam frame, runs the monitor pipeline and records any
/// resulting violations. A critical alert terminates the assignment in
/// the same request.
#[axum::debug_handler]
pub async fn submit_frame(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FramePayload>,
) -> Result<impl IntoResponse> {
    let requester = claims.requester();
    let assignment = state.assignment_service.get_assignment(id, &requester).await?;
    if assignment.is_terminal() {
        state.proctoring_service.discard_session(id);
        return Ok(Json(FrameResponse {
            alerts: Vec::new(),
            violations: assignment.violations,
            terminated: assignment.terminated,
            termination_message: assignment.termination_message,
        }));
    }

    let frame = vision::decode_frame(&payload.image)?;
    let now = Utc::now();
    let alerts = state.proctoring_service.process_frame(id, &frame, now);

    let mut violations = assignment.violations;
    let mut terminated = false;
    let mut termination_message = None;
    for alert in &alerts {
        let outcome = state
            .assignment_service
            .record_violation_at(
                id,
                alert.kind,
                alert.severity,
                alert.message.clone(),
                None,
                now,
            )
            .await?;
        violations = outcome.violations;
        if outcome.terminated {
            terminated = true;
            termination_message = outcome.termination_message;
            break;
        }
    }

    if terminated {
        state.proctoring_service.discard_session(id);
    }

    Ok(Json(FrameResponse {
        alerts,
        violations,
        terminated,
        termination_message,
    }))
}

/// Records a violation observed by the exam client itself, such as a tab
/// switch or fullscreen exit. Severity follows the violation kind.
#[axum::debug_handler]
pub async fn report_violation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ViolationPayload>,
) -> Result<impl IntoResponse> {
    let requester = claims.requester();
    state.assignment_service.get_assignment(id, &requester).await?;

    let captured = payload
        .captured_image
        .as_deref()
        .map(vision::decode_base64_image)
        .transpose()?;
    let outcome = state
        .assignment_service
        .record_violation(
            id,
            payload.kind,
            payload.kind.default_severity(),
            payload.message,
            captured,
        )
        .await?;
    if outcome.terminated {
        state.proctoring_service.discard_session(id);
    }
    Ok(Json(outcome))
}

/// Validates and stores the candidate's reference face image, both in the
/// live session and on the assignment document.
#[axum::debug_handler]
pub async fn setup_reference(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FramePayload>,
) -> Result<impl IntoResponse> {
    let requester = claims.requester();
    let assignment = state.assignment_service.get_assignment(id, &requester).await?;
    if assignment.is_terminal() {
        return Err(Error::BadRequest(
            "Assignment is no longer active".to_string(),
        ));
    }

    let raw = vision::decode_base64_image(&payload.image)?;
    let frame = vision::decode_frame(&payload.image)?;
    state
        .proctoring_service
        .setup_reference(id, &frame, Utc::now())
        .map_err(Error::BadRequest)?;
    state
        .assignment_service
        .store_reference_image(id, &requester, raw)
        .await?;

    Ok(Json(json!({
        "status": "reference_stored",
        "advisory_mode": state.proctoring_service.advisory_mode(),
    })))
}
