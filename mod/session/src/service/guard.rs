//! Routing guard.
//!
//! Evaluated on every navigation; computes the caller's authorization
//! state from the session credential's claims alone — no profile store
//! round-trip per request. The staleness that trade buys is closed by
//! the explicit credential refresh at the end of onboarding.
//!
//! Any failure to read the identity degrades to `Anonymous` (redirect
//! to login), never to open access.

use tracing::warn;

use relief_backend::Role;

use crate::model::{RouteDecision, ONBOARDING_PATH};
use crate::service::SessionService;

/// Legacy unscoped dashboard path, kept as an alias that lands on the
/// caller's role home.
const DASHBOARD_PATH: &str = "/dashboard";

const LOGIN_PATH: &str = "/login";
const SIGNUP_PATH: &str = "/signup";

/// Per-request authorization state. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    Anonymous,
    AuthenticatedNoRole,
    AuthenticatedWithRole(Role),
}

impl SessionService {
    /// Decide whether a navigation to `path` is allowed, and where to
    /// send the caller otherwise. Read-only: the guard never mutates
    /// session or profile state.
    pub async fn evaluate_route(&self, path: &str) -> RouteDecision {
        let path = normalize(path);
        match self.auth_state().await {
            AuthState::Anonymous => {
                if self.is_public(path) {
                    RouteDecision::Allow
                } else {
                    RouteDecision::login()
                }
            }
            AuthState::AuthenticatedNoRole => {
                // Until a role exists the only page destination is
                // onboarding. The public prefixes stay reachable: the
                // session API is one of them, and redirecting it would
                // lock the caller out of the very flow that assigns the
                // role.
                if in_section(path, ONBOARDING_PATH) || self.is_public(path) {
                    RouteDecision::Allow
                } else {
                    RouteDecision::onboarding()
                }
            }
            AuthState::AuthenticatedWithRole(role) => self.evaluate_with_role(path, role),
        }
    }

    fn evaluate_with_role(&self, path: &str, role: Role) -> RouteDecision {
        if in_section(path, LOGIN_PATH) || in_section(path, SIGNUP_PATH) {
            return RouteDecision::role_home(role);
        }
        if in_section(path, DASHBOARD_PATH) {
            return RouteDecision::role_home(role);
        }
        if in_section(path, ONBOARDING_PATH) {
            // The onboarding page checks completion itself and
            // self-redirects; duplicating that here would cost a
            // profile lookup on every request.
            return RouteDecision::Allow;
        }
        if let Some(scope) = role_scope(path) {
            return if scope == role {
                RouteDecision::Allow
            } else {
                RouteDecision::role_home(role)
            };
        }
        RouteDecision::Allow
    }

    /// Derive the caller's state from the credential claims, failing
    /// closed on any provider error.
    async fn auth_state(&self) -> AuthState {
        match self.identity.session_claims().await {
            Ok(Some(identity)) => match identity.role() {
                Some(role) => AuthState::AuthenticatedWithRole(role),
                None => AuthState::AuthenticatedNoRole,
            },
            Ok(None) => AuthState::Anonymous,
            Err(e) => {
                warn!("identity read failed, failing closed: {}", e);
                AuthState::Anonymous
            }
        }
    }

    fn is_public(&self, path: &str) -> bool {
        self.config
            .public_paths
            .iter()
            .any(|prefix| in_section(path, prefix))
    }
}

/// Strip query string and trailing slash (except for the root).
fn normalize(path: &str) -> &str {
    let path = path.split('?').next().unwrap_or(path);
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// True when `path` is `section` itself or nested under it.
fn in_section(path: &str, section: &str) -> bool {
    if section == "/" {
        return path == "/";
    }
    path == section || path.strip_prefix(section).is_some_and(|rest| rest.starts_with('/'))
}

/// The role implied by a role-scoped path prefix, if any.
fn role_scope(path: &str) -> Option<Role> {
    let first = path.strip_prefix('/')?.split('/').next()?;
    Role::parse(first)
}
