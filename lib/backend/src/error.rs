use thiserror::Error;

/// Errors from the identity provider.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// No valid session for an operation that requires one.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The provider rejected an OAuth code exchange. Carries the
    /// provider's error code and description for support diagnosis.
    #[error("auth exchange rejected: {code}: {description}")]
    Exchange { code: String, description: String },

    /// Network failure, timeout, or unexpected provider response.
    /// Call sites treat this as "assume unauthenticated" — never
    /// retry-forever.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the profile store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing table or migration is missing. Fatal for the lookup
    /// (retrying cannot help) but not for the session.
    #[error("schema unavailable: {0}")]
    SchemaMissing(String),

    /// An upsert was rejected (constraint violation). User-visible and
    /// retryable.
    #[error("write rejected: {0}")]
    Constraint(String),

    /// Network failure, timeout, or unexpected store response.
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}
