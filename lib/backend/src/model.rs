use serde::{Deserialize, Serialize};

// ── Role ────────────────────────────────────────────────────────────

/// The closed set of functional roles. Every mapping off this enum is a
/// total `match` — adding a role is a compile error until each mapping
/// handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Victim,
    Ngo,
    Donor,
    Volunteer,
    Admin,
}

impl Role {
    /// Roles a user may pick for themselves during onboarding.
    /// Admin accounts are provisioned out of band.
    pub const SELF_SERVE: [Role; 4] = [Role::Victim, Role::Ngo, Role::Donor, Role::Volunteer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Victim => "victim",
            Role::Ngo => "ngo",
            Role::Donor => "donor",
            Role::Volunteer => "volunteer",
            Role::Admin => "admin",
        }
    }

    /// Parse from the lowercase wire form.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "victim" => Some(Role::Victim),
            "ngo" => Some(Role::Ngo),
            "donor" => Some(Role::Donor),
            "volunteer" => Some(Role::Volunteer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// The role-scoped area this role lands on after login.
    pub fn home_path(&self) -> &'static str {
        match self {
            Role::Victim => "/victim",
            Role::Ngo => "/ngo",
            Role::Donor => "/donor",
            Role::Volunteer => "/volunteer",
            Role::Admin => "/admin",
        }
    }

    /// The role-detail table backing this role's onboarding form.
    pub fn detail_table(&self) -> &'static str {
        match self {
            Role::Victim => "victim_details",
            Role::Ngo => "ngo_details",
            Role::Donor => "donor_details",
            Role::Volunteer => "volunteer_details",
            Role::Admin => "admin_details",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Identity ────────────────────────────────────────────────────────

/// An authenticated principal as issued by the identity provider.
///
/// The metadata bag is owned by the provider; the application only reads
/// and merge-patches it (it carries `role` once chosen).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-issued id (also the profile row key).
    pub id: String,

    /// Email address.
    pub email: String,

    /// Mutable metadata bag. Contains `role` once chosen, and optionally
    /// `full_name` from signup.
    #[serde(default)]
    pub metadata: serde_json::Value,

    /// RFC 3339 expiry of the session credential, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl Identity {
    /// The role recorded in metadata, if any and valid.
    pub fn role(&self) -> Option<Role> {
        self.metadata
            .get("role")
            .and_then(|v| v.as_str())
            .and_then(Role::parse)
    }

    pub fn full_name(&self) -> Option<&str> {
        self.metadata.get("full_name").and_then(|v| v.as_str())
    }
}

// ── Profile ─────────────────────────────────────────────────────────

/// The application-level profile row, keyed by identity id.
///
/// Created by a database trigger at identity-creation time — so it may
/// not exist yet when a fresh identity first shows up. If present, its
/// `role` may still be null (trigger ran before a role was chosen).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Identity id (primary key).
    pub id: String,

    #[serde(default)]
    pub role: Option<Role>,

    #[serde(default)]
    pub is_profile_completed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// RFC 3339 creation timestamp.
    pub created_at: String,

    /// RFC 3339 last update timestamp.
    pub updated_at: String,
}

/// Partial profile write. Only set fields are written, so an upsert
/// never clobbers columns the caller did not mention.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_profile_completed: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

// ── Role-detail records ─────────────────────────────────────────────

/// Role-specific extension data, one row per profile in the role's
/// detail table. Written exclusively by the onboarding flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum RoleDetail {
    Victim {
        #[serde(default)]
        needs: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
    Ngo {
        #[serde(default)]
        organization_name: String,
        #[serde(default)]
        registration_number: String,
        #[serde(default)]
        focus_areas: Vec<String>,
    },
    Donor {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        donor_type: Option<String>,
    },
    Volunteer {
        #[serde(default)]
        skills: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        availability: Option<String>,
    },
}

impl RoleDetail {
    /// The role this detail record belongs to.
    pub fn role(&self) -> Role {
        match self {
            RoleDetail::Victim { .. } => Role::Victim,
            RoleDetail::Ngo { .. } => Role::Ngo,
            RoleDetail::Donor { .. } => Role::Donor,
            RoleDetail::Volunteer { .. } => Role::Volunteer,
        }
    }
}
