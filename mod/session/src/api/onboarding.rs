use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use relief_backend::{Role, RoleDetail};
use relief_core::{error_code, ServiceError};

use crate::api::AppState;
use crate::model::{FieldError, OnboardingForm, OnboardingState};
use crate::service::SessionError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/onboarding", get(state))
        .route("/onboarding/role", post(select_role))
        .route("/onboarding/submit", post(submit))
}

/// Where the caller currently is in the onboarding flow.
/// GET /session/onboarding
async fn state(State(svc): State<AppState>) -> Result<Json<OnboardingState>, ServiceError> {
    let state = svc.onboarding_state().await.map_err(ServiceError::from)?;
    Ok(Json(state))
}

#[derive(serde::Deserialize)]
struct SelectRoleRequest {
    role: Role,
}

/// Record the chosen role and advance to the role form.
/// POST /session/onboarding/role
async fn select_role(
    State(svc): State<AppState>,
    Json(body): Json<SelectRoleRequest>,
) -> Response {
    match svc.select_role(body.role).await {
        Ok(_) => Json(OnboardingState::RoleForm { role: body.role }).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(serde::Deserialize)]
struct SubmitRequest {
    role: Role,
    #[serde(default)]
    full_name: Option<String>,
    /// Role-specific fields; validated against `role`'s schema.
    detail: serde_json::Value,
}

/// Submit the role form and complete onboarding.
/// POST /session/onboarding/submit
async fn submit(State(svc): State<AppState>, Json(body): Json<SubmitRequest>) -> Response {
    // The detail payload is tagged by the declared role before it is
    // decoded, so a shape mismatch surfaces as a field error rather than
    // a bare 422.
    let mut detail = body.detail;
    if let Some(obj) = detail.as_object_mut() {
        obj.insert("role".to_string(), json!(body.role.as_str()));
    }
    let detail: RoleDetail = match serde_json::from_value(detail) {
        Ok(d) => d,
        Err(e) => {
            return validation_response(&[FieldError::new(
                "detail",
                format!("malformed role detail: {}", e),
            )]);
        }
    };

    let form = OnboardingForm { full_name: body.full_name, detail };
    match svc.submit_onboarding(body.role, form).await {
        Ok(done) => Json(done).into_response(),
        Err(e) => error_response(e),
    }
}

/// Map a session error to a response, keeping per-field validation
/// detail that the generic [`ServiceError`] body cannot carry.
fn error_response(err: SessionError) -> Response {
    match err {
        SessionError::Validation(fields) => validation_response(&fields),
        other => ServiceError::from(other).into_response(),
    }
}

fn validation_response(fields: &[FieldError]) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "code": error_code::VALIDATION_FAILED,
            "message": "validation failed",
            "fields": fields,
        })),
    )
        .into_response()
}
