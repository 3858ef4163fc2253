mod auth;
mod guard;
mod middleware;
mod onboarding;

use std::sync::Arc;

use axum::Router;

use crate::service::SessionService;

pub use middleware::guard_middleware;

/// Shared application state.
pub type AppState = Arc<SessionService>;

/// Build the complete session API router.
///
/// All routes are relative — they are nested under `/session` here, so
/// the caller merges the result into the application router as-is.
pub fn build_router(svc: Arc<SessionService>) -> Router {
    let api = Router::new()
        .merge(guard::routes())
        .merge(onboarding::routes())
        .merge(auth::routes());

    Router::new().nest("/session", api).with_state(svc)
}
