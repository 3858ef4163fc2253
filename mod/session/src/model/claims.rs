use serde::Serialize;

use relief_backend::Role;

/// The authorization-relevant view of Identity metadata + Profile used
/// for routing decisions. Derived, read-only; stale from the moment the
/// profile changes server-side until the credential is refreshed.
#[derive(Debug, Clone, Serialize)]
pub struct SessionClaim {
    /// Identity id (also the profile row key).
    pub identity_id: String,

    pub email: String,

    /// Role from the session credential's metadata, falling back to the
    /// cached profile snapshot.
    pub role: Option<Role>,

    /// Whether onboarding has been completed, per the cached profile
    /// snapshot. False when no snapshot is available.
    pub profile_completed: bool,
}
