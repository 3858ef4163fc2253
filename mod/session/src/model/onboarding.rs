use serde::{Deserialize, Serialize};

use relief_backend::{Role, RoleDetail};

/// Path of the onboarding flow. Always reachable while authenticated —
/// the page itself checks completion and self-redirects.
pub const ONBOARDING_PATH: &str = "/onboarding";

/// Where a caller currently is in the onboarding flow.
///
/// `Submitting` only exists while a submit call is in flight; the state
/// derivation never returns it. A failed submit leaves the stored state
/// unchanged, so re-derivation lands back on `RoleForm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OnboardingState {
    RolePicker,
    RoleForm { role: Role },
    Submitting,
    Complete { role: Role },
}

/// Onboarding form payload: shared fields plus the role-specific detail
/// record.
#[derive(Debug, Clone, Deserialize)]
pub struct OnboardingForm {
    #[serde(default)]
    pub full_name: Option<String>,

    pub detail: RoleDetail,
}

/// One failed form field, surfaced inline by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Successful terminal result of the onboarding flow. The UI navigates
/// to `home` with a full reload so the guard re-evaluates against the
/// freshly refreshed credential.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedOnboarding {
    pub role: Role,
    pub home: String,
}

/// Result of an OAuth code login: who signed in and where to send them.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub identity_id: String,
    pub redirect_to: String,
}
