//! REST implementations of the backend contracts, speaking to a hosted
//! GoTrue-style auth endpoint (`/auth/v1/*`) and a PostgREST-style data
//! endpoint (`/rest/v1/*`).
//!
//! Every call site maps transport failure to `Unavailable` — callers
//! assume unauthenticated / degrade rather than retry forever.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{IdentityError, StoreError};
use crate::model::{Identity, Profile, ProfilePatch, RoleDetail};
use crate::{IdentityProvider, ProfileStore};

/// A live session against the hosted backend.
#[derive(Debug, Clone)]
struct RestSession {
    access_token: String,
    refresh_token: String,
    user: Identity,
}

/// Identity provider backed by a GoTrue-style auth service.
///
/// Holds the session tokens and a snapshot of the identity as of the
/// last credential issue; `session_claims` serves that snapshot without
/// a network round-trip, which is exactly the staleness window the
/// post-write refresh closes.
pub struct RestIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<RestSession>>,
}

impl RestIdentityProvider {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            session: RwLock::new(None),
        }
    }

    /// Current access token, for sibling clients that authenticate with
    /// the same session (the profile store).
    pub async fn access_token(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.access_token.clone())
    }

    async fn store_session(&self, token_json: &serde_json::Value) -> Result<Identity, IdentityError> {
        let access_token = token_json["access_token"]
            .as_str()
            .ok_or_else(|| IdentityError::Unavailable("missing access_token in response".into()))?
            .to_string();
        let refresh_token = token_json["refresh_token"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let mut user = parse_identity(&token_json["user"])?;
        if let Some(exp) = token_json["expires_at"].as_i64() {
            user.expires_at = chrono::DateTime::from_timestamp(exp, 0).map(|t| t.to_rfc3339());
        }
        *self.session.write().await = Some(RestSession {
            access_token,
            refresh_token,
            user: user.clone(),
        });
        Ok(user)
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn current_identity(&self) -> Result<Option<Identity>, IdentityError> {
        let Some(token) = self.access_token().await else {
            return Ok(None);
        };

        let resp = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("identity fetch failed: {}", e)))?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            // Expired or revoked session — not an outage.
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(IdentityError::Unavailable(format!(
                "identity fetch returned {}: {}",
                status, body
            )));
        }

        let user: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("identity parse failed: {}", e)))?;
        Ok(Some(parse_identity(&user)?))
    }

    async fn session_claims(&self) -> Result<Option<Identity>, IdentityError> {
        Ok(self.session.read().await.as_ref().map(|s| s.user.clone()))
    }

    async fn patch_metadata(
        &self,
        patch: serde_json::Value,
    ) -> Result<Identity, IdentityError> {
        let token = self.access_token().await.ok_or(IdentityError::NotAuthenticated)?;

        let resp = self
            .http
            .put(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "data": patch }))
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("metadata patch failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(IdentityError::Unavailable(format!(
                "metadata patch returned {}: {}",
                status, body
            )));
        }

        let user: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("metadata parse failed: {}", e)))?;
        // The cached session snapshot is left as-is: claims stay stale
        // until refresh_credential re-issues the credential.
        parse_identity(&user)
    }

    async fn refresh_credential(&self) -> Result<Identity, IdentityError> {
        let refresh_token = {
            let session = self.session.read().await;
            session
                .as_ref()
                .map(|s| s.refresh_token.clone())
                .ok_or(IdentityError::NotAuthenticated)?
        };

        let resp = self
            .http
            .post(format!(
                "{}/auth/v1/token?grant_type=refresh_token",
                self.base_url
            ))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("credential refresh failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(IdentityError::Unavailable(format!(
                "credential refresh returned {}: {}",
                status, body
            )));
        }

        let token_json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("refresh parse failed: {}", e)))?;
        debug!("session credential re-issued");
        self.store_session(&token_json).await
    }

    async fn exchange_code(&self, code: &str) -> Result<Identity, IdentityError> {
        let resp = self
            .http
            .post(format!(
                "{}/auth/v1/token?grant_type=authorization_code",
                self.base_url
            ))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("code exchange failed: {}", e)))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(parse_exchange_error(&body));
        }

        let token_json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("exchange parse failed: {}", e)))?;
        self.store_session(&token_json).await
    }
}

/// Map a GoTrue user object to an [`Identity`].
fn parse_identity(user: &serde_json::Value) -> Result<Identity, IdentityError> {
    let id = user["id"]
        .as_str()
        .ok_or_else(|| IdentityError::Unavailable("user object missing id".into()))?
        .to_string();
    Ok(Identity {
        id,
        email: user["email"].as_str().unwrap_or_default().to_string(),
        metadata: user
            .get("user_metadata")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({})),
        expires_at: None,
    })
}

/// Map a failed exchange response body to [`IdentityError::Exchange`],
/// preserving the provider's code and description for the error page.
fn parse_exchange_error(body: &str) -> IdentityError {
    let parsed: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let code = parsed["error"]
        .as_str()
        .or_else(|| parsed["error_code"].as_str())
        .unwrap_or("exchange_failed")
        .to_string();
    let description = parsed["error_description"]
        .as_str()
        .or_else(|| parsed["msg"].as_str())
        .unwrap_or(body)
        .to_string();
    IdentityError::Exchange { code, description }
}

// ── Profile store ───────────────────────────────────────────────────

/// Profile store backed by a PostgREST-style data endpoint.
///
/// Upserts use `Prefer: resolution=merge-duplicates` so they are
/// idempotent under "row already exists" — the trigger may or may not
/// have created the profile row first.
pub struct RestProfileStore {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    identity: Arc<RestIdentityProvider>,
}

impl RestProfileStore {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        identity: Arc<RestIdentityProvider>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            identity,
        }
    }

    async fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}/rest/v1/{}", self.base_url, path))
            .header("apikey", &self.anon_key);
        if let Some(token) = self.identity.access_token().await {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait]
impl ProfileStore for RestProfileStore {
    async fn get_profile(&self, identity_id: &str) -> Result<Option<Profile>, StoreError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("profiles?id=eq.{}&select=*", identity_id))
            .await
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("profile lookup failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_store_error(status, &body));
        }

        let mut rows: Vec<Profile> = resp
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("profile parse failed: {}", e)))?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    async fn upsert_profile(
        &self,
        identity_id: &str,
        patch: ProfilePatch,
    ) -> Result<Profile, StoreError> {
        let mut row = serde_json::to_value(&patch)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        row["id"] = serde_json::json!(identity_id);

        let resp = self
            .request(reqwest::Method::POST, "profiles?on_conflict=id")
            .await
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&serde_json::json!([row]))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("profile upsert failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_store_error(status, &body));
        }

        let mut rows: Vec<Profile> = resp
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("profile parse failed: {}", e)))?;
        if rows.is_empty() {
            return Err(StoreError::Unavailable(
                "profile upsert returned no representation".into(),
            ));
        }
        Ok(rows.swap_remove(0))
    }

    async fn upsert_role_detail(
        &self,
        identity_id: &str,
        detail: RoleDetail,
    ) -> Result<(), StoreError> {
        let table = detail.role().detail_table();
        let mut row = serde_json::to_value(&detail)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        // The serde tag names the table; the row itself is keyed by id.
        if let Some(obj) = row.as_object_mut() {
            obj.remove("role");
        }
        row["id"] = serde_json::json!(identity_id);

        let resp = self
            .request(reqwest::Method::POST, &format!("{}?on_conflict=id", table))
            .await
            .header("Prefer", "resolution=merge-duplicates")
            .json(&serde_json::json!([row]))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("detail upsert failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_store_error(status, &body));
        }
        Ok(())
    }
}

/// Classify a PostgREST error response.
///
/// `42P01` (undefined table) signals a partially-provisioned deployment:
/// fatal for the lookup, callers must stop retrying. `23xxx` codes are
/// constraint violations (retryable writes). Everything else is an
/// outage.
fn classify_store_error(status: StatusCode, body: &str) -> StoreError {
    let code = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["code"].as_str().map(String::from));

    match code.as_deref() {
        Some("42P01") => StoreError::SchemaMissing(body.to_string()),
        Some(c) if c.starts_with("23") => StoreError::Constraint(body.to_string()),
        _ if status == StatusCode::CONFLICT => StoreError::Constraint(body.to_string()),
        _ => StoreError::Unavailable(format!("store returned {}: {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_identity_maps_metadata() {
        let user = serde_json::json!({
            "id": "u-1",
            "email": "a@example.org",
            "user_metadata": {"role": "donor"}
        });
        let identity = parse_identity(&user).unwrap();
        assert_eq!(identity.id, "u-1");
        assert_eq!(identity.metadata["role"], "donor");

        assert!(parse_identity(&serde_json::json!({"email": "x"})).is_err());
    }

    #[test]
    fn exchange_error_keeps_provider_context() {
        let err = parse_exchange_error(
            r#"{"error": "invalid_grant", "error_description": "code expired"}"#,
        );
        match err {
            IdentityError::Exchange { code, description } => {
                assert_eq!(code, "invalid_grant");
                assert_eq!(description, "code expired");
            }
            other => panic!("expected Exchange, got {:?}", other),
        }
    }

    #[test]
    fn store_error_classification() {
        let schema = classify_store_error(
            StatusCode::NOT_FOUND,
            r#"{"code": "42P01", "message": "relation \"profiles\" does not exist"}"#,
        );
        assert!(matches!(schema, StoreError::SchemaMissing(_)));

        let constraint = classify_store_error(
            StatusCode::CONFLICT,
            r#"{"code": "23505", "message": "duplicate key"}"#,
        );
        assert!(matches!(constraint, StoreError::Constraint(_)));

        let outage = classify_store_error(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(outage, StoreError::Unavailable(_)));
    }
}
