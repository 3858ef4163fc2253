//! In-memory backends with failure injection.
//!
//! Used by the test suites and by `reliefd --dev`. The identity provider
//! keeps two views of the identity — server state and the credential
//! snapshot — so tests can observe the staleness window between a
//! metadata patch and the credential refresh that closes it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use relief_core::merge_patch;

use crate::error::{IdentityError, StoreError};
use crate::model::{Identity, Profile, ProfilePatch, RoleDetail};
use crate::{IdentityProvider, ProfileStore};

// ── Identity provider ───────────────────────────────────────────────

#[derive(Default)]
struct IdentityState {
    /// Authoritative provider-side identity.
    server: Option<Identity>,
    /// Identity as baked into the current session credential. Lags
    /// behind `server` until `refresh_credential`.
    credential: Option<Identity>,
    /// Codes accepted by `exchange_code`.
    exchangeable: HashMap<String, Identity>,
    offline: bool,
    refresh_count: u32,
}

/// Scriptable in-memory identity provider.
#[derive(Default)]
pub struct MemoryIdentityProvider {
    inner: Mutex<IdentityState>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish a session directly (as if a login just happened).
    /// Both the server state and the credential snapshot are set.
    pub fn sign_in(&self, identity: Identity) {
        let mut state = self.inner.lock().unwrap();
        state.server = Some(identity.clone());
        state.credential = Some(identity);
    }

    /// Register an authorization code that `exchange_code` will accept.
    pub fn register_code(&self, code: impl Into<String>, identity: Identity) {
        self.inner.lock().unwrap().exchangeable.insert(code.into(), identity);
    }

    /// Simulate a provider outage: every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }

    /// How many times the credential has been re-issued.
    pub fn refresh_count(&self) -> u32 {
        self.inner.lock().unwrap().refresh_count
    }

    /// Inspect the authoritative server-side identity.
    pub fn server_identity(&self) -> Option<Identity> {
        self.inner.lock().unwrap().server.clone()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn current_identity(&self) -> Result<Option<Identity>, IdentityError> {
        let state = self.inner.lock().unwrap();
        if state.offline {
            return Err(IdentityError::Unavailable("provider offline".into()));
        }
        Ok(state.server.clone())
    }

    async fn session_claims(&self) -> Result<Option<Identity>, IdentityError> {
        let state = self.inner.lock().unwrap();
        if state.offline {
            return Err(IdentityError::Unavailable("provider offline".into()));
        }
        Ok(state.credential.clone())
    }

    async fn patch_metadata(
        &self,
        patch: serde_json::Value,
    ) -> Result<Identity, IdentityError> {
        let mut state = self.inner.lock().unwrap();
        if state.offline {
            return Err(IdentityError::Unavailable("provider offline".into()));
        }
        let identity = state.server.as_mut().ok_or(IdentityError::NotAuthenticated)?;
        merge_patch(&mut identity.metadata, &patch);
        // The credential snapshot is deliberately left untouched: claims
        // stay stale until refresh_credential.
        Ok(identity.clone())
    }

    async fn refresh_credential(&self) -> Result<Identity, IdentityError> {
        let mut state = self.inner.lock().unwrap();
        if state.offline {
            return Err(IdentityError::Unavailable("provider offline".into()));
        }
        let identity = state.server.clone().ok_or(IdentityError::NotAuthenticated)?;
        state.credential = Some(identity.clone());
        state.refresh_count += 1;
        Ok(identity)
    }

    async fn exchange_code(&self, code: &str) -> Result<Identity, IdentityError> {
        let mut state = self.inner.lock().unwrap();
        if state.offline {
            return Err(IdentityError::Unavailable("provider offline".into()));
        }
        match state.exchangeable.remove(code) {
            Some(identity) => {
                state.server = Some(identity.clone());
                state.credential = Some(identity.clone());
                Ok(identity)
            }
            None => Err(IdentityError::Exchange {
                code: "invalid_grant".into(),
                description: format!("unknown or expired authorization code '{}'", code),
            }),
        }
    }
}

// ── Profile store ───────────────────────────────────────────────────

#[derive(Default)]
struct StoreState {
    profiles: HashMap<String, Profile>,
    /// (detail table, identity id) -> record.
    details: HashMap<(String, String), RoleDetail>,
    schema_missing: bool,
    offline: bool,
    /// Report the profile row as absent for this many more reads —
    /// simulates the window before the creation trigger has run.
    hide_reads: u32,
    /// Reject this many more detail upserts with a constraint error.
    fail_detail_upserts: u32,
    get_calls: u32,
}

/// In-memory profile store with failure injection.
#[derive(Default)]
pub struct MemoryProfileStore {
    inner: Mutex<StoreState>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a profile row directly, as the database trigger would.
    pub fn insert_profile(&self, profile: Profile) {
        let mut state = self.inner.lock().unwrap();
        state.profiles.insert(profile.id.clone(), profile);
    }

    /// Pretend the backing table does not exist.
    pub fn set_schema_missing(&self, missing: bool) {
        self.inner.lock().unwrap().schema_missing = missing;
    }

    /// Simulate a store outage.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }

    /// Report the profile row as absent for the next `n` reads.
    pub fn hide_profile_for_reads(&self, n: u32) {
        self.inner.lock().unwrap().hide_reads = n;
    }

    /// Reject the next `n` role-detail upserts with a constraint error.
    pub fn fail_detail_upserts(&self, n: u32) {
        self.inner.lock().unwrap().fail_detail_upserts = n;
    }

    /// Number of `get_profile` calls observed (retry accounting).
    pub fn get_call_count(&self) -> u32 {
        self.inner.lock().unwrap().get_calls
    }

    pub fn profile(&self, identity_id: &str) -> Option<Profile> {
        self.inner.lock().unwrap().profiles.get(identity_id).cloned()
    }

    pub fn detail(&self, table: &str, identity_id: &str) -> Option<RoleDetail> {
        self.inner
            .lock()
            .unwrap()
            .details
            .get(&(table.to_string(), identity_id.to_string()))
            .cloned()
    }

    /// Total number of detail rows across all tables.
    pub fn detail_count(&self) -> usize {
        self.inner.lock().unwrap().details.len()
    }
}

fn apply_patch(profile: &mut Profile, patch: &ProfilePatch) {
    if let Some(role) = patch.role {
        profile.role = Some(role);
    }
    if let Some(done) = patch.is_profile_completed {
        profile.is_profile_completed = done;
    }
    if let Some(ref name) = patch.full_name {
        profile.full_name = Some(name.clone());
    }
    if let Some(ref email) = patch.email {
        profile.email = Some(email.clone());
    }
    if let Some(ref org) = patch.organization {
        profile.organization = Some(org.clone());
    }
    profile.updated_at = relief_core::now_rfc3339();
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, identity_id: &str) -> Result<Option<Profile>, StoreError> {
        let mut state = self.inner.lock().unwrap();
        if state.schema_missing {
            return Err(StoreError::SchemaMissing(
                "relation \"profiles\" does not exist".into(),
            ));
        }
        if state.offline {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        state.get_calls += 1;
        if state.hide_reads > 0 {
            state.hide_reads -= 1;
            return Ok(None);
        }
        Ok(state.profiles.get(identity_id).cloned())
    }

    async fn upsert_profile(
        &self,
        identity_id: &str,
        patch: ProfilePatch,
    ) -> Result<Profile, StoreError> {
        let mut state = self.inner.lock().unwrap();
        if state.schema_missing {
            return Err(StoreError::SchemaMissing(
                "relation \"profiles\" does not exist".into(),
            ));
        }
        if state.offline {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        let now = relief_core::now_rfc3339();
        let profile = state
            .profiles
            .entry(identity_id.to_string())
            .or_insert_with(|| Profile {
                id: identity_id.to_string(),
                role: None,
                is_profile_completed: false,
                full_name: None,
                email: None,
                organization: None,
                created_at: now.clone(),
                updated_at: now,
            });
        apply_patch(profile, &patch);
        Ok(profile.clone())
    }

    async fn upsert_role_detail(
        &self,
        identity_id: &str,
        detail: RoleDetail,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock().unwrap();
        if state.schema_missing {
            return Err(StoreError::SchemaMissing(format!(
                "relation \"{}\" does not exist",
                detail.role().detail_table()
            )));
        }
        if state.offline {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        if state.fail_detail_upserts > 0 {
            state.fail_detail_upserts -= 1;
            return Err(StoreError::Constraint(
                "insert or update violates foreign key constraint".into(),
            ));
        }
        let table = detail.role().detail_table().to_string();
        state.details.insert((table, identity_id.to_string()), detail);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn identity(id: &str, metadata: serde_json::Value) -> Identity {
        Identity {
            id: id.into(),
            email: format!("{}@example.org", id),
            metadata,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn metadata_patch_leaves_claims_stale_until_refresh() {
        let provider = MemoryIdentityProvider::new();
        provider.sign_in(identity("u1", serde_json::json!({})));

        provider
            .patch_metadata(serde_json::json!({"role": "victim"}))
            .await
            .unwrap();

        // Server state has the role; the credential does not.
        let server = provider.current_identity().await.unwrap().unwrap();
        assert_eq!(server.role(), Some(Role::Victim));
        let claims = provider.session_claims().await.unwrap().unwrap();
        assert_eq!(claims.role(), None);

        provider.refresh_credential().await.unwrap();
        let claims = provider.session_claims().await.unwrap().unwrap();
        assert_eq!(claims.role(), Some(Role::Victim));
    }

    #[tokio::test]
    async fn exchange_unknown_code_is_rejected_with_context() {
        let provider = MemoryIdentityProvider::new();
        let err = provider.exchange_code("bogus").await.unwrap_err();
        match err {
            IdentityError::Exchange { code, description } => {
                assert_eq!(code, "invalid_grant");
                assert!(description.contains("bogus"));
            }
            other => panic!("expected Exchange, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn profile_upsert_creates_then_updates() {
        let store = MemoryProfileStore::new();

        let created = store
            .upsert_profile("u1", ProfilePatch { role: Some(Role::Donor), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(created.role, Some(Role::Donor));
        assert!(!created.is_profile_completed);

        let updated = store
            .upsert_profile(
                "u1",
                ProfilePatch { is_profile_completed: Some(true), ..Default::default() },
            )
            .await
            .unwrap();
        // Previous fields survive a partial patch.
        assert_eq!(updated.role, Some(Role::Donor));
        assert!(updated.is_profile_completed);
    }

    #[tokio::test]
    async fn hidden_reads_simulate_trigger_race() {
        let store = MemoryProfileStore::new();
        store.insert_profile(Profile {
            id: "u1".into(),
            role: None,
            is_profile_completed: false,
            full_name: None,
            email: None,
            organization: None,
            created_at: relief_core::now_rfc3339(),
            updated_at: relief_core::now_rfc3339(),
        });
        store.hide_profile_for_reads(2);

        assert!(store.get_profile("u1").await.unwrap().is_none());
        assert!(store.get_profile("u1").await.unwrap().is_none());
        assert!(store.get_profile("u1").await.unwrap().is_some());
        assert_eq!(store.get_call_count(), 3);
    }

    #[tokio::test]
    async fn schema_missing_beats_offline_and_reads() {
        let store = MemoryProfileStore::new();
        store.set_schema_missing(true);
        match store.get_profile("u1").await {
            Err(StoreError::SchemaMissing(_)) => {}
            other => panic!("expected SchemaMissing, got {:?}", other),
        }
    }
}
