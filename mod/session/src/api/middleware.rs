use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::api::AppState;
use crate::model::RouteDecision;

/// Routing-guard middleware for page routes.
///
/// Evaluates every request path against the guard and issues a 307 when
/// the decision is a redirect. Mount this on the page router only — the
/// `/session` API answers decisions as JSON and must stay reachable for
/// the login flow itself (it is covered by the default public paths).
pub async fn guard_middleware(
    State(svc): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    match svc.evaluate_route(&path).await {
        RouteDecision::Allow => next.run(req).await,
        RouteDecision::Redirect { to, .. } => Redirect::temporary(&to).into_response(),
    }
}
