//! Session state, role resolution and route guards for the portal.
//!
//! Authentication itself is delegated to the hosted identity provider; this
//! crate holds the resulting tokens, works out whether the signed-in user is
//! a patient or a doctor, and decides which routes may render.

pub mod guards;
pub mod roles;
pub mod session;

#[cfg(feature = "client")]
pub mod rest;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use guards::{require_doctor, require_linked_patient, require_session, GuardOutcome};
pub use roles::{EnrichedUser, Role, RoleRecord};
pub use session::{AuthSnapshot, AuthUser, EnrichmentTicket, Session, SessionStore};

#[cfg(feature = "client")]
pub use rest::RestRoleStore;
#[cfg(feature = "client")]
pub use roles::{RoleResolver, RoleStore};
#[cfg(feature = "client")]
pub use session::enrich_session;

const DEFAULT_ROLE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_ROLES_TABLE: &str = "user_roles";

/// Redirect targets used by the route guards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuardConfig {
    pub login_path: String,
    pub doctor_login_path: String,
    /// Where patients without a linked clinical record are sent.
    pub link_record_path: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            doctor_login_path: "/doctor/login".to_string(),
            link_record_path: "/onboarding".to_string(),
        }
    }
}

/// Connection and policy settings for the managed backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    /// Base URL of the managed backend, without trailing slash.
    pub api_url: String,
    /// Public (anon) API key sent with every request.
    pub anon_key: String,
    pub roles_table: String,
    pub role_lookup_timeout_ms: u64,
    #[serde(default)]
    pub guards: GuardConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            anon_key: String::new(),
            roles_table: DEFAULT_ROLES_TABLE.to_string(),
            role_lookup_timeout_ms: DEFAULT_ROLE_TIMEOUT_MS,
            guards: GuardConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Read the configuration from process environment variables.
    ///
    /// `PORTAL_API_URL` and `PORTAL_ANON_KEY` are required;
    /// `PORTAL_ROLES_TABLE` and `PORTAL_ROLE_TIMEOUT_MS` are optional.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| AuthError::Config(format!("{key} is not set")))
        };

        let mut config = Self {
            api_url: required("PORTAL_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            anon_key: required("PORTAL_ANON_KEY")?,
            ..Self::default()
        };

        if let Some(table) = lookup("PORTAL_ROLES_TABLE").filter(|t| !t.trim().is_empty()) {
            config.roles_table = table.trim().to_string();
        }

        if let Some(raw) = lookup("PORTAL_ROLE_TIMEOUT_MS") {
            config.role_lookup_timeout_ms = raw.trim().parse().map_err(|_| {
                AuthError::Config(format!("PORTAL_ROLE_TIMEOUT_MS is not a number: {raw}"))
            })?;
        }

        Ok(config)
    }

    pub fn role_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.role_lookup_timeout_ms)
    }
}

/// Errors from configuration and the role store.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Could not decode backend response: {0}")]
    Decode(String),
    #[error("Session store lock poisoned")]
    LockPoisoned,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_requires_url_and_key() {
        let err = AuthConfig::from_lookup(lookup_from(&[("PORTAL_ANON_KEY", "anon")]))
            .unwrap_err();
        assert!(matches!(err, AuthError::Config(msg) if msg.contains("PORTAL_API_URL")));
    }

    #[test]
    fn config_defaults_and_overrides() {
        let config = AuthConfig::from_lookup(lookup_from(&[
            ("PORTAL_API_URL", "https://example.test/"),
            ("PORTAL_ANON_KEY", "anon"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://example.test");
        assert_eq!(config.roles_table, "user_roles");
        assert_eq!(config.role_lookup_timeout(), Duration::from_secs(5));
        assert_eq!(config.guards.doctor_login_path, "/doctor/login");

        let config = AuthConfig::from_lookup(lookup_from(&[
            ("PORTAL_API_URL", "https://example.test"),
            ("PORTAL_ANON_KEY", "anon"),
            ("PORTAL_ROLES_TABLE", "roles"),
            ("PORTAL_ROLE_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.roles_table, "roles");
        assert_eq!(config.role_lookup_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn config_rejects_bad_timeout() {
        let result = AuthConfig::from_lookup(lookup_from(&[
            ("PORTAL_API_URL", "https://example.test"),
            ("PORTAL_ANON_KEY", "anon"),
            ("PORTAL_ROLE_TIMEOUT_MS", "soon"),
        ]));
        assert!(matches!(result, Err(AuthError::Config(_))));
    }
}
