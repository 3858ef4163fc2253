//! Session module — session & profile-provisioning orchestration.
//!
//! # Responsibilities
//!
//! - **Provisioning reconciler** — bounded retry loop bridging the race
//!   between identity creation and the database trigger that materializes
//!   the profile row.
//! - **Routing guard** — per-request decision: allow, or redirect to
//!   login / onboarding / the caller's role home. Fails closed.
//! - **Onboarding state machine** — role picker → role form → submit,
//!   with sequenced idempotent writes and a credential refresh at the end
//!   so the guard sees up-to-date claims.
//! - **Session context** — process-wide Identity+Profile snapshot with an
//!   explicit lifecycle (login, logout, refresh).
//!
//! # Usage
//!
//! ```ignore
//! use relief_session::{SessionModule, service::SessionConfig};
//!
//! let module = SessionModule::new(identity, profiles, SessionConfig::default());
//! let router = module.routes(); // Mounted at /session
//! ```

pub mod api;
pub mod model;
pub mod service;

use std::sync::Arc;

use axum::Router;

use relief_backend::{IdentityProvider, ProfileStore};
use relief_core::Module;

use crate::service::{SessionConfig, SessionService};

/// Session module implementing the Module trait.
pub struct SessionModule {
    service: Arc<SessionService>,
}

impl SessionModule {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        config: SessionConfig,
    ) -> Self {
        let service = SessionService::new(identity, profiles, config);
        Self { service }
    }

    /// Get a reference to the underlying SessionService.
    pub fn service(&self) -> &Arc<SessionService> {
        &self.service
    }
}

impl Module for SessionModule {
    fn name(&self) -> &str {
        "session"
    }

    fn routes(&self) -> Router {
        api::build_router(Arc::clone(&self.service))
    }
}
