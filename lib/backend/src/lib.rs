//! Backend contracts for the two external collaborators: the hosted
//! identity provider and the profile store.
//!
//! The session module never talks HTTP directly — it holds
//! `Arc<dyn IdentityProvider>` and `Arc<dyn ProfileStore>` and works
//! against these traits. Two implementations ship here:
//!
//! - [`rest`] — a hosted GoTrue/PostgREST-style backend over reqwest.
//! - [`memory`] — in-process maps with failure injection, used by tests
//!   and by the server's dev mode.

pub mod error;
pub mod memory;
pub mod model;
pub mod rest;

use async_trait::async_trait;

pub use error::{IdentityError, StoreError};
pub use model::{Identity, Profile, ProfilePatch, Role, RoleDetail};

/// The external identity provider. Issues and refreshes opaque session
/// credentials; this layer never mints one itself.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetch the current identity from the provider (network round-trip,
    /// authoritative server state). `Ok(None)` means no valid session.
    async fn current_identity(&self) -> Result<Option<Identity>, IdentityError>;

    /// The identity as carried by the current session credential. No
    /// network round-trip. Stale with respect to any metadata patch until
    /// [`refresh_credential`](Self::refresh_credential) re-issues the
    /// credential — the routing guard reads this view on every request.
    async fn session_claims(&self) -> Result<Option<Identity>, IdentityError>;

    /// Apply an RFC 7386 merge patch to the current identity's metadata.
    /// Returns the updated server-side identity; the session credential
    /// keeps its old claims until refreshed.
    async fn patch_metadata(
        &self,
        patch: serde_json::Value,
    ) -> Result<Identity, IdentityError>;

    /// Force re-issue of the session credential so subsequent
    /// [`session_claims`](Self::session_claims) reflect server state.
    async fn refresh_credential(&self) -> Result<Identity, IdentityError>;

    /// Exchange an OAuth authorization code for a session.
    async fn exchange_code(&self, code: &str) -> Result<Identity, IdentityError>;
}

/// The external profile store: one row per identity, created
/// asynchronously by a database trigger on identity creation. Row
/// presence and its `role`/`is_profile_completed` fields are the ground
/// truth for authorization decisions.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Point lookup by identity id. `Ok(None)` covers the window before
    /// the trigger has run.
    async fn get_profile(&self, identity_id: &str) -> Result<Option<Profile>, StoreError>;

    /// Idempotent insert-or-update of the profile row. Must tolerate the
    /// trigger having already created the row — or not yet.
    async fn upsert_profile(
        &self,
        identity_id: &str,
        patch: ProfilePatch,
    ) -> Result<Profile, StoreError>;

    /// Idempotent insert-or-update of the role-detail row keyed by the
    /// same identity id. The caller sequences this after the profile
    /// upsert (foreign key to the parent row).
    async fn upsert_role_detail(
        &self,
        identity_id: &str,
        detail: RoleDetail,
    ) -> Result<(), StoreError>;
}
