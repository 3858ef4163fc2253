pub mod context;
pub mod guard;
pub mod onboarding;
pub mod reconciler;

use std::sync::Arc;

use thiserror::Error;

use relief_backend::{IdentityError, IdentityProvider, ProfileStore, Role, StoreError};

use crate::model::FieldError;

pub use context::{SessionContext, SessionSnapshot};
pub use reconciler::{Provisioned, RetryPolicy};

/// Session service error type.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not authenticated")]
    NotAuthenticated,

    /// Form failed its role-specific schema. The flow stays in
    /// `RoleForm`; errors are surfaced per field.
    #[error("validation failed: {}", format_fields(.0))]
    Validation(Vec<FieldError>),

    /// A profile or role-detail upsert was rejected. User-visible and
    /// retryable; the flow never advances past it.
    #[error("write rejected: {0}")]
    Write(String),

    /// Metadata patch or credential refresh failed after the rows were
    /// written. The completion is not observable until a retry succeeds.
    #[error("credential update failed: {0}")]
    Credential(String),

    /// The identity provider rejected an OAuth code exchange.
    #[error("auth exchange rejected: {code}: {description}")]
    Exchange { code: String, description: String },

    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

fn format_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<IdentityError> for SessionError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::NotAuthenticated => SessionError::NotAuthenticated,
            IdentityError::Exchange { code, description } => {
                SessionError::Exchange { code, description }
            }
            IdentityError::Unavailable(m) => SessionError::Unavailable(m),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Constraint(m) => SessionError::Write(m),
            StoreError::SchemaMissing(m) | StoreError::Unavailable(m) => {
                SessionError::Unavailable(m)
            }
        }
    }
}

impl From<SessionError> for relief_core::ServiceError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotAuthenticated => {
                relief_core::ServiceError::Unauthorized("not authenticated".into())
            }
            SessionError::Validation(_) => {
                relief_core::ServiceError::Validation(e.to_string())
            }
            SessionError::Write(m) => relief_core::ServiceError::Conflict(m),
            SessionError::Credential(m) | SessionError::Unavailable(m) => {
                relief_core::ServiceError::Unavailable(m)
            }
            SessionError::Exchange { .. } => {
                relief_core::ServiceError::Unauthorized(e.to_string())
            }
        }
    }
}

/// Configuration for the session service.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Retry policy for the provisioning reconciler.
    pub retry: RetryPolicy,

    /// Role assumed when provisioning degrades (schema unavailable) and
    /// the identity carries no role of its own.
    pub default_role: Role,

    /// Path prefixes reachable without a session. An entry matches the
    /// path itself and everything nested under it.
    pub public_paths: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            default_role: Role::Victim,
            public_paths: vec![
                "/".to_string(),
                "/login".to_string(),
                "/signup".to_string(),
                "/auth".to_string(),
                "/session".to_string(),
                "/health".to_string(),
                "/version".to_string(),
            ],
        }
    }
}

/// The session service. Holds the backend collaborators and configuration.
pub struct SessionService {
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) profiles: Arc<dyn ProfileStore>,
    pub(crate) config: SessionConfig,
    pub(crate) context: SessionContext,
}

impl SessionService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            profiles,
            config,
            context: SessionContext::new(),
        })
    }
}
