use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use relief_core::ServiceError;

use crate::api::AppState;
use crate::service::SessionError;

/// Error page the login UI renders from query parameters.
const AUTH_ERROR_PATH: &str = "/auth/error";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/callback", get(callback))
        .route("/claims", get(claims))
        .route("/logout", post(logout))
}

#[derive(serde::Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth callback — exchange the authorization code for a session and
/// send the caller to their landing page.
/// GET /session/callback?code=...
///
/// Never surfaces a raw error body to the browser: every failure path
/// redirects to the auth error page with the provider's code and
/// description preserved as query parameters.
async fn callback(State(svc): State<AppState>, Query(params): Query<CallbackParams>) -> Redirect {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        return error_redirect(&error, &description);
    }
    let Some(code) = params.code else {
        return error_redirect("missing_code", "callback carried neither code nor error");
    };

    match svc.login_with_code(&code).await {
        Ok(outcome) => Redirect::temporary(&outcome.redirect_to),
        Err(SessionError::Exchange { code, description }) => error_redirect(&code, &description),
        Err(e) => error_redirect("exchange_failed", &e.to_string()),
    }
}

/// Current session claims.
/// GET /session/claims
async fn claims(State(svc): State<AppState>) -> Response {
    match svc.session_claim().await {
        Ok(Some(claim)) => Json(claim).into_response(),
        Ok(None) => ServiceError::Unauthorized("no active session".into()).into_response(),
        Err(e) => ServiceError::from(e).into_response(),
    }
}

/// Drop the cached session context.
/// POST /session/logout
async fn logout(State(svc): State<AppState>) -> StatusCode {
    svc.logout().await;
    StatusCode::NO_CONTENT
}

fn error_redirect(code: &str, description: &str) -> Redirect {
    Redirect::temporary(&format!(
        "{}?code={}&description={}",
        AUTH_ERROR_PATH,
        urlencode(code),
        urlencode(description)
    ))
}

/// Minimal percent-encoding for query parameter values.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
