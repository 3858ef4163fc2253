use serde::Serialize;

use relief_backend::Role;

/// Why a navigation was redirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectReason {
    /// No valid session — sent to login.
    Login,
    /// Authenticated but not provisioned — sent to onboarding.
    Onboarding,
    /// Authenticated in the wrong area — sent to the caller's own
    /// role home, never to login.
    RoleHome,
}

/// Routing guard verdict for a single navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RouteDecision {
    Allow,
    Redirect { to: String, reason: RedirectReason },
}

impl RouteDecision {
    pub fn login() -> Self {
        RouteDecision::Redirect {
            to: "/login".to_string(),
            reason: RedirectReason::Login,
        }
    }

    pub fn onboarding() -> Self {
        RouteDecision::Redirect {
            to: crate::model::ONBOARDING_PATH.to_string(),
            reason: RedirectReason::Onboarding,
        }
    }

    pub fn role_home(role: Role) -> Self {
        RouteDecision::Redirect {
            to: role.home_path().to_string(),
            reason: RedirectReason::RoleHome,
        }
    }

    /// Redirect target, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            RouteDecision::Allow => None,
            RouteDecision::Redirect { to, .. } => Some(to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_serde_shape() {
        let allow = serde_json::to_value(RouteDecision::Allow).unwrap();
        assert_eq!(allow, serde_json::json!({"decision": "allow"}));

        let redirect = serde_json::to_value(RouteDecision::role_home(Role::Ngo)).unwrap();
        assert_eq!(
            redirect,
            serde_json::json!({"decision": "redirect", "to": "/ngo", "reason": "role_home"})
        );
    }
}
