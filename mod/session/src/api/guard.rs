use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::AppState;
use crate::model::RouteDecision;

pub fn routes() -> Router<AppState> {
    Router::new().route("/route", post(route))
}

#[derive(serde::Deserialize)]
struct RouteRequest {
    path: String,
}

/// Evaluate the routing guard for a path.
/// POST /session/route
///
/// Infallible: provider errors degrade to a login redirect inside the
/// guard, so the endpoint always answers with a decision.
async fn route(State(svc): State<AppState>, Json(body): Json<RouteRequest>) -> Json<RouteDecision> {
    Json(svc.evaluate_route(&body.path).await)
}
