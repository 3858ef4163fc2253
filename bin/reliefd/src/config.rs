//! Server configuration loaded from TOML.
//!
//! ```toml
//! [backend]
//! url = "https://project.example.co"
//! anon_key = "..."
//!
//! [guard]
//! public_paths = ["/", "/login", "/signup", "/auth", "/session", "/health", "/version"]
//!
//! [provisioning]
//! max_attempts = 3
//! retry_delay_ms = 1000
//! default_role = "victim"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use relief_backend::Role;
use relief_session::service::{RetryPolicy, SessionConfig};

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub backend: BackendConfig,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the hosted backend (auth and data endpoints).
    pub url: String,

    /// Publishable API key sent with every request.
    pub anon_key: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct GuardConfig {
    /// Path prefixes reachable without a session. Empty means the
    /// built-in defaults.
    #[serde(default)]
    pub public_paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProvisioningConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Role assumed when provisioning degrades. Parsed against the
    /// closed role set at startup.
    pub default_role: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self { max_attempts: 3, retry_delay_ms: 1000, default_role: "victim".to_string() }
    }
}

impl ServerConfig {
    /// Resolve a context name to `/etc/reliefd/<name>.toml`. Anything
    /// containing `/` or `.` is treated as a literal path.
    pub fn resolve_path(name_or_path: &str) -> PathBuf {
        if name_or_path.contains('/') || name_or_path.contains('.') {
            PathBuf::from(name_or_path)
        } else {
            PathBuf::from(format!("/etc/reliefd/{}.toml", name_or_path))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("cannot parse {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Verify the configuration is ready for use.
    pub fn verify(&self) -> anyhow::Result<()> {
        if self.backend.url.is_empty() {
            anyhow::bail!("backend.url is empty in configuration");
        }
        if self.backend.anon_key.is_empty() {
            anyhow::bail!("backend.anon_key is empty in configuration");
        }
        if self.provisioning.max_attempts == 0 {
            anyhow::bail!("provisioning.max_attempts must be at least 1");
        }
        if Role::parse(&self.provisioning.default_role).is_none() {
            anyhow::bail!(
                "provisioning.default_role '{}' is not a known role",
                self.provisioning.default_role
            );
        }
        Ok(())
    }

    /// Translate into the session module's configuration.
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig {
            retry: RetryPolicy {
                max_attempts: self.provisioning.max_attempts,
                delay: Duration::from_millis(self.provisioning.retry_delay_ms),
            },
            ..Default::default()
        };
        if let Some(role) = Role::parse(&self.provisioning.default_role) {
            config.default_role = role;
        }
        if !self.guard.public_paths.is_empty() {
            config.public_paths = self.guard.public_paths.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> ServerConfig {
        toml::from_str(
            r#"
            [backend]
            url = "https://relief.example.co"
            anon_key = "anon"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn resolve_path_name_vs_path() {
        assert_eq!(
            ServerConfig::resolve_path("prod"),
            PathBuf::from("/etc/reliefd/prod.toml")
        );
        assert_eq!(
            ServerConfig::resolve_path("./local.toml"),
            PathBuf::from("./local.toml")
        );
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = minimal();
        config.verify().unwrap();

        let session = config.session_config();
        assert_eq!(session.retry.max_attempts, 3);
        assert_eq!(session.retry.delay, Duration::from_millis(1000));
        assert_eq!(session.default_role, Role::Victim);
        assert!(!session.public_paths.is_empty());
    }

    #[test]
    fn verify_rejects_bad_values() {
        let mut config = minimal();
        config.backend.url = String::new();
        assert!(config.verify().is_err());

        let mut config = minimal();
        config.provisioning.max_attempts = 0;
        assert!(config.verify().is_err());

        let mut config = minimal();
        config.provisioning.default_role = "root".to_string();
        assert!(config.verify().is_err());
    }

    #[test]
    fn overrides_are_applied() {
        let config: ServerConfig = toml::from_str(
            r#"
            [backend]
            url = "https://relief.example.co"
            anon_key = "anon"

            [guard]
            public_paths = ["/", "/session"]

            [provisioning]
            max_attempts = 5
            retry_delay_ms = 250
            default_role = "donor"
            "#,
        )
        .unwrap();
        config.verify().unwrap();

        let session = config.session_config();
        assert_eq!(session.retry.max_attempts, 5);
        assert_eq!(session.retry.delay, Duration::from_millis(250));
        assert_eq!(session.default_role, Role::Donor);
        assert_eq!(session.public_paths, vec!["/", "/session"]);
    }
}
