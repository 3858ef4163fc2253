//! Session context: a process-wide snapshot of the signed-in identity
//! and its profile row.
//!
//! The snapshot has an explicit lifecycle — populated on login (or at
//! startup for an existing session), refreshed after onboarding writes,
//! cleared on logout. Readers get the cached view; they never trigger a
//! backend fetch of their own.

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use relief_backend::{Identity, Profile};

use crate::model::{LoginOutcome, SessionClaim, ONBOARDING_PATH};
use crate::service::{Provisioned, SessionError, SessionService};

/// What the context caches for the current session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub identity: Identity,

    /// The profile row, when provisioned. `None` while the creation
    /// trigger is still catching up.
    pub profile: Option<Profile>,
}

/// Shared holder for the current [`SessionSnapshot`].
pub struct SessionContext {
    snapshot: RwLock<Option<SessionSnapshot>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self { snapshot: RwLock::new(None) }
    }

    pub async fn get(&self) -> Option<SessionSnapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn set(&self, snapshot: SessionSnapshot) {
        *self.snapshot.write().await = Some(snapshot);
    }

    pub async fn clear(&self) {
        *self.snapshot.write().await = None;
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionService {
    /// Populate the context from the backend: one identity fetch, one
    /// profile lookup. Clears the context when no session exists.
    pub async fn initialize_context(&self) -> Result<Option<SessionSnapshot>, SessionError> {
        let Some(identity) = self.identity.current_identity().await? else {
            self.context.clear().await;
            return Ok(None);
        };
        // Single lookup, no retry budget: the context tolerates a missing
        // row and the reconciler owns the trigger race.
        let profile = self.profiles.get_profile(&identity.id).await.unwrap_or_else(|e| {
            debug!("profile lookup for context failed: {}", e);
            None
        });
        let snapshot = SessionSnapshot { identity, profile };
        self.context.set(snapshot.clone()).await;
        Ok(Some(snapshot))
    }

    /// Refresh the cached snapshot after a write. Errors are swallowed;
    /// a stale snapshot is corrected on the next successful reload.
    pub(crate) async fn reload_context(&self) {
        if let Err(e) = self.initialize_context().await {
            debug!("context reload failed: {}", e);
        }
    }

    /// Exchange an OAuth authorization code for a session, populate the
    /// context, and decide where the caller lands.
    pub async fn login_with_code(&self, code: &str) -> Result<LoginOutcome, SessionError> {
        let identity = self.identity.exchange_code(code).await?;
        info!(identity = %identity.id, "signed in");

        self.reload_context().await;

        let redirect_to = match self.provision_profile(&identity.id).await {
            Provisioned::Ready(Profile { is_profile_completed: true, role: Some(role), .. }) => {
                role.home_path().to_string()
            }
            _ => ONBOARDING_PATH.to_string(),
        };
        Ok(LoginOutcome { identity_id: identity.id, redirect_to })
    }

    /// Drop the cached session state. The credential itself is revoked
    /// by the identity provider's own sign-out flow.
    pub async fn logout(&self) {
        self.context.clear().await;
        info!("session context cleared");
    }

    /// Current claims for the UI: credential metadata plus the cached
    /// completion flag. `None` when there is no session.
    pub async fn session_claim(&self) -> Result<Option<SessionClaim>, SessionError> {
        let Some(identity) = self.identity.session_claims().await? else {
            return Ok(None);
        };
        let profile_completed = match self.context.get().await {
            Some(snapshot) if snapshot.identity.id == identity.id => snapshot
                .profile
                .map(|p| p.is_profile_completed)
                .unwrap_or(false),
            _ => false,
        };
        Ok(Some(SessionClaim {
            identity_id: identity.id.clone(),
            email: identity.email.clone(),
            role: identity.role(),
            profile_completed,
        }))
    }
}
