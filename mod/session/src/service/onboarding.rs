//! Onboarding state machine: `RolePicker → RoleForm(role) → Submitting
//! → Complete`.
//!
//! Every write is an upsert so the flow is idempotent under "row already
//! exists" — the profile row may or may not have been created by the
//! database trigger, and a failed submit may be retried. The completion
//! flag is only ever set after the supporting rows exist, and the
//! session credential is refreshed last so the routing guard never
//! observes "completed" before the data backing it.

use tracing::{debug, info};

use relief_backend::{Identity, ProfilePatch, Role, RoleDetail};

use crate::model::{CompletedOnboarding, FieldError, OnboardingForm, OnboardingState};
use crate::service::{Provisioned, SessionError, SessionService};

impl SessionService {
    /// Derive where the caller currently is in the flow.
    ///
    /// Resume semantics: a recorded role (profile row or identity
    /// metadata) with an incomplete profile lands on `RoleForm`, never
    /// back on `RolePicker` — abandoning a submit mid-way must not
    /// re-prompt for the role.
    pub async fn onboarding_state(&self) -> Result<OnboardingState, SessionError> {
        let identity = self
            .identity
            .current_identity()
            .await?
            .ok_or(SessionError::NotAuthenticated)?;

        let state = match self.provision_profile(&identity.id).await {
            Provisioned::Ready(profile) => {
                if profile.is_profile_completed {
                    match profile.role.or_else(|| identity.role()) {
                        Some(role) => OnboardingState::Complete { role },
                        // Completed flag without a role should not be
                        // reachable; route back through the form to
                        // self-heal rather than trusting it.
                        None => OnboardingState::RolePicker,
                    }
                } else {
                    match profile.role.or_else(|| identity.role()) {
                        Some(role) => OnboardingState::RoleForm { role },
                        None => OnboardingState::RolePicker,
                    }
                }
            }
            Provisioned::Pending => match identity.role() {
                Some(role) => OnboardingState::RoleForm { role },
                None => OnboardingState::RolePicker,
            },
            // Degraded deployment: never leave the caller stuck. Open the
            // form for whatever role we know, or the configured default.
            Provisioned::SchemaUnavailable => OnboardingState::RoleForm {
                role: identity.role().unwrap_or(self.config.default_role),
            },
        };
        Ok(state)
    }

    /// `RolePicker → RoleForm`: record the chosen role in identity
    /// metadata so a page reload resumes at the form.
    ///
    /// This is staging only — the guard keeps reading the old credential
    /// claims until the post-submit refresh makes the role authoritative.
    pub async fn select_role(&self, role: Role) -> Result<Identity, SessionError> {
        if !Role::SELF_SERVE.contains(&role) {
            return Err(SessionError::Validation(vec![FieldError::new(
                "role",
                format!("role '{}' is not self-assignable", role),
            )]));
        }
        let identity = self
            .identity
            .patch_metadata(serde_json::json!({ "role": role.as_str() }))
            .await?;
        debug!(identity = %identity.id, role = %role, "role selected (staged)");
        Ok(identity)
    }

    /// `RoleForm → Submitting → Complete`.
    ///
    /// Writes are sequenced: profile row before detail row (foreign
    /// key), both before the completion flag, and the credential refresh
    /// last. Any failure surfaces and leaves the flow where it was —
    /// never a half-completed profile on the happy path.
    pub async fn submit_onboarding(
        &self,
        role: Role,
        form: OnboardingForm,
    ) -> Result<CompletedOnboarding, SessionError> {
        if !Role::SELF_SERVE.contains(&role) {
            return Err(SessionError::Validation(vec![FieldError::new(
                "role",
                format!("role '{}' is not self-assignable", role),
            )]));
        }
        let errors = validate_form(role, &form);
        if !errors.is_empty() {
            return Err(SessionError::Validation(errors));
        }

        let identity = self
            .identity
            .current_identity()
            .await?
            .ok_or(SessionError::NotAuthenticated)?;

        // 1. Ensure the parent profile row exists — upsert, not insert,
        //    because the creation trigger may already have run.
        let mut patch = ProfilePatch {
            role: Some(role),
            email: Some(identity.email.clone()),
            full_name: form
                .full_name
                .clone()
                .or_else(|| identity.full_name().map(str::to_string)),
            ..Default::default()
        };
        if let RoleDetail::Ngo { organization_name, .. } = &form.detail {
            patch.organization = Some(organization_name.clone());
        }
        self.profiles.upsert_profile(&identity.id, patch).await?;

        // 2. Role-detail row. On failure we stop here: the completion
        //    flag must never be set over a missing detail row.
        self.profiles
            .upsert_role_detail(&identity.id, form.detail)
            .await?;

        // 3. Completion flag, now that the supporting rows exist.
        self.profiles
            .upsert_profile(
                &identity.id,
                ProfilePatch { is_profile_completed: Some(true), ..Default::default() },
            )
            .await?;

        // 4. Patch metadata and re-issue the credential so the guard's
        //    claims check is immediately consistent.
        self.identity
            .patch_metadata(serde_json::json!({ "role": role.as_str() }))
            .await
            .map_err(|e| SessionError::Credential(e.to_string()))?;
        self.identity
            .refresh_credential()
            .await
            .map_err(|e| SessionError::Credential(e.to_string()))?;
        self.reload_context().await;

        info!(identity = %identity.id, role = %role, "onboarding complete");
        Ok(CompletedOnboarding { role, home: role.home_path().to_string() })
    }
}

/// Validate a form against its role-specific schema. Field requirements
/// differ per role; errors are surfaced inline per field.
fn validate_form(role: Role, form: &OnboardingForm) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if form.detail.role() != role {
        errors.push(FieldError::new("role", "form payload does not match the selected role"));
        return errors;
    }

    match &form.detail {
        RoleDetail::Victim { needs, .. } => {
            if !needs.iter().any(|n| !n.trim().is_empty()) {
                errors.push(FieldError::new("needs", "select at least one need"));
            }
        }
        RoleDetail::Ngo { organization_name, registration_number, .. } => {
            if organization_name.trim().is_empty() {
                errors.push(FieldError::new("organization_name", "organization name is required"));
            }
            if registration_number.trim().is_empty() {
                errors.push(FieldError::new(
                    "registration_number",
                    "registration number is required",
                ));
            }
        }
        RoleDetail::Volunteer { skills, .. } => {
            if !skills.iter().any(|s| !s.trim().is_empty()) {
                errors.push(FieldError::new("skills", "list at least one skill"));
            }
        }
        RoleDetail::Donor { .. } => {}
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RouteDecision;
    use crate::service::testutil::{bare_profile, identity, test_service};

    fn victim_form() -> OnboardingForm {
        OnboardingForm {
            full_name: Some("Amal K".to_string()),
            detail: RoleDetail::Victim {
                needs: vec!["water".to_string(), "medical aid".to_string()],
                location: None,
            },
        }
    }

    // Scenario: new identity, trigger lags, row appears on the third
    // lookup with no role — flow starts at the picker.
    #[tokio::test]
    async fn fresh_identity_starts_at_role_picker() {
        let (svc, provider, profiles) = test_service();
        provider.sign_in(identity("u1", serde_json::json!({})));
        profiles.insert_profile(bare_profile("u1"));
        profiles.hide_profile_for_reads(2);

        assert_eq!(svc.onboarding_state().await.unwrap(), OnboardingState::RolePicker);
        assert_eq!(profiles.get_call_count(), 3);
    }

    // Scenario: victim picks needs, completes, and the guard immediately
    // honors the new role.
    #[tokio::test]
    async fn victim_flow_completes_and_guard_honors_role() {
        let (svc, provider, profiles) = test_service();
        provider.sign_in(identity("u1", serde_json::json!({})));

        svc.select_role(Role::Victim).await.unwrap();
        let done = svc.submit_onboarding(Role::Victim, victim_form()).await.unwrap();
        assert_eq!(done.role, Role::Victim);
        assert_eq!(done.home, "/victim");

        let profile = profiles.profile("u1").unwrap();
        assert_eq!(profile.role, Some(Role::Victim));
        assert!(profile.is_profile_completed);
        match profiles.detail("victim_details", "u1").unwrap() {
            RoleDetail::Victim { needs, .. } => {
                assert_eq!(needs, vec!["water", "medical aid"]);
            }
            other => panic!("unexpected detail {:?}", other),
        }

        // The submit refreshed the credential, so no extra refresh is
        // needed for the guard to see the role.
        match svc.evaluate_route("/ngo").await {
            RouteDecision::Redirect { to, .. } => assert_eq!(to, "/victim"),
            RouteDecision::Allow => panic!("mismatched role area must not be allowed"),
        }
        assert_eq!(svc.evaluate_route("/victim").await, RouteDecision::Allow);
    }

    // Scenario: role chosen at signup time — picker is skipped.
    #[tokio::test]
    async fn signup_role_skips_picker() {
        let (svc, provider, _profiles) = test_service();
        provider.sign_in(identity("u1", serde_json::json!({"role": "ngo"})));

        assert_eq!(
            svc.onboarding_state().await.unwrap(),
            OnboardingState::RoleForm { role: Role::Ngo }
        );
    }

    // Scenario: detail upsert fails, flow stays put, retry converges
    // with no duplicate rows.
    #[tokio::test]
    async fn detail_failure_never_reaches_complete_then_retry_succeeds() {
        let (svc, provider, profiles) = test_service();
        provider.sign_in(identity("u1", serde_json::json!({})));
        profiles.fail_detail_upserts(1);

        let err = svc.submit_onboarding(Role::Victim, victim_form()).await.unwrap_err();
        assert!(matches!(err, SessionError::Write(_)));

        // Profile upsert succeeded, but the completion flag was never set
        // and no credential refresh happened.
        let profile = profiles.profile("u1").unwrap();
        assert!(!profile.is_profile_completed);
        assert_eq!(profiles.detail_count(), 0);
        assert_eq!(provider.refresh_count(), 0);

        // Re-entry resumes at the form (role already recorded), not the picker.
        assert_eq!(
            svc.onboarding_state().await.unwrap(),
            OnboardingState::RoleForm { role: Role::Victim }
        );

        let done = svc.submit_onboarding(Role::Victim, victim_form()).await.unwrap();
        assert_eq!(done.home, "/victim");
        assert_eq!(profiles.detail_count(), 1);
        assert!(profiles.profile("u1").unwrap().is_profile_completed);
    }

    #[tokio::test]
    async fn repeated_submits_are_idempotent() {
        let (svc, provider, profiles) = test_service();
        provider.sign_in(identity("u1", serde_json::json!({})));

        svc.submit_onboarding(Role::Victim, victim_form()).await.unwrap();
        let first = profiles.profile("u1").unwrap();

        svc.submit_onboarding(Role::Victim, victim_form()).await.unwrap();
        let second = profiles.profile("u1").unwrap();

        assert_eq!(profiles.detail_count(), 1);
        assert_eq!(first.role, second.role);
        assert_eq!(first.full_name, second.full_name);
        assert!(second.is_profile_completed);
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn victim_without_needs_fails_validation() {
        let (svc, provider, _profiles) = test_service();
        provider.sign_in(identity("u1", serde_json::json!({})));

        let form = OnboardingForm {
            full_name: None,
            detail: RoleDetail::Victim { needs: vec!["  ".to_string()], location: None },
        };
        match svc.submit_onboarding(Role::Victim, form).await.unwrap_err() {
            SessionError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "needs");
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ngo_requires_organization_and_registration() {
        let (svc, provider, _profiles) = test_service();
        provider.sign_in(identity("u1", serde_json::json!({})));

        let form = OnboardingForm {
            full_name: None,
            detail: RoleDetail::Ngo {
                organization_name: String::new(),
                registration_number: String::new(),
                focus_areas: vec![],
            },
        };
        match svc.submit_onboarding(Role::Ngo, form).await.unwrap_err() {
            SessionError::Validation(errors) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["organization_name", "registration_number"]);
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn mismatched_payload_is_rejected() {
        let (svc, provider, _profiles) = test_service();
        provider.sign_in(identity("u1", serde_json::json!({})));

        let form = OnboardingForm {
            full_name: None,
            detail: RoleDetail::Donor { donor_type: None },
        };
        match svc.submit_onboarding(Role::Victim, form).await.unwrap_err() {
            SessionError::Validation(errors) => assert_eq!(errors[0].field, "role"),
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn admin_is_not_self_serve() {
        let (svc, provider, _profiles) = test_service();
        provider.sign_in(identity("u1", serde_json::json!({})));

        assert!(matches!(
            svc.select_role(Role::Admin).await.unwrap_err(),
            SessionError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn abandoned_submit_resumes_at_role_form() {
        let (svc, provider, profiles) = test_service();
        provider.sign_in(identity("u1", serde_json::json!({})));
        // A prior attempt got as far as the profile upsert.
        let mut profile = bare_profile("u1");
        profile.role = Some(Role::Volunteer);
        profiles.insert_profile(profile);

        assert_eq!(
            svc.onboarding_state().await.unwrap(),
            OnboardingState::RoleForm { role: Role::Volunteer }
        );
    }

    #[tokio::test]
    async fn completed_profile_reports_complete() {
        let (svc, provider, profiles) = test_service();
        provider.sign_in(identity("u1", serde_json::json!({"role": "donor"})));
        let mut profile = bare_profile("u1");
        profile.role = Some(Role::Donor);
        profile.is_profile_completed = true;
        profiles.insert_profile(profile);

        assert_eq!(
            svc.onboarding_state().await.unwrap(),
            OnboardingState::Complete { role: Role::Donor }
        );
    }

    #[tokio::test]
    async fn schema_outage_degrades_to_default_role_form() {
        let (svc, provider, profiles) = test_service();
        provider.sign_in(identity("u1", serde_json::json!({})));
        profiles.set_schema_missing(true);

        assert_eq!(
            svc.onboarding_state().await.unwrap(),
            OnboardingState::RoleForm { role: Role::Victim }
        );
    }

    #[tokio::test]
    async fn unauthenticated_state_is_an_error() {
        let (svc, _provider, _profiles) = test_service();
        assert!(matches!(
            svc.onboarding_state().await.unwrap_err(),
            SessionError::NotAuthenticated
        ));
    }
}
