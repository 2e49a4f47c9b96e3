//! Role lookup for signed-in users.
//!
//! An unknown role always resolves to `Patient`, the least privileged role.
//! Lookup failures are logged and never reach the UI.

use serde::{Deserialize, Serialize};

use crate::session::AuthUser;

#[cfg(feature = "client")]
use std::future::Future;
#[cfg(feature = "client")]
use std::time::Duration;

#[cfg(feature = "client")]
use crate::{AuthConfig, AuthError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Patient,
    Doctor,
}

impl Role {
    /// Parse a stored role; anything unrecognized is a patient.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "doctor" => Role::Doctor,
            _ => Role::Patient,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
        }
    }
}

/// Row of the roles table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RoleRecord {
    pub role: Role,
    /// Identifier of the clinical patient record linked to this account.
    pub patient_id: Option<String>,
}

/// Session user enriched with its role and linked record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnrichedUser {
    #[serde(flatten)]
    pub user: AuthUser,
    pub role: Role,
    pub patient_id: Option<String>,
}

impl EnrichedUser {
    pub fn new(user: AuthUser, record: RoleRecord) -> Self {
        Self {
            user,
            role: record.role,
            patient_id: record.patient_id,
        }
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }

    pub fn has_linked_record(&self) -> bool {
        self.patient_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
    }
}

/// Source of role rows.
#[cfg(feature = "client")]
pub trait RoleStore: Send + Sync {
    /// Fetch the role row of `user_id`; `Ok(None)` when the user has none.
    fn fetch_role(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<RoleRecord>, AuthError>> + Send;
}

/// Resolves roles with a bounded wait and a patient fallback.
#[cfg(feature = "client")]
pub struct RoleResolver<S> {
    store: S,
    timeout: Duration,
}

#[cfg(feature = "client")]
impl<S: RoleStore> RoleResolver<S> {
    pub fn new(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn from_config(store: S, config: &AuthConfig) -> Self {
        Self::new(store, config.role_lookup_timeout())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Enrich `user` with its role. Never fails.
    pub async fn resolve(&self, user: &AuthUser) -> EnrichedUser {
        let lookup = tokio::time::timeout(self.timeout, self.store.fetch_role(&user.id)).await;

        let record = match lookup {
            Ok(Ok(Some(record))) => record,
            Ok(Ok(None)) => {
                tracing::warn!(user_id = %user.id, "No role row found, defaulting to patient");
                RoleRecord::default()
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    user_id = %user.id,
                    error = %err,
                    "Role lookup failed, defaulting to patient"
                );
                RoleRecord::default()
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %user.id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Role lookup timed out, defaulting to patient"
                );
                RoleRecord::default()
            }
        };

        tracing::debug!(user_id = %user.id, role = record.role.as_str(), "Role resolved");
        EnrichedUser::new(user.clone(), record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_roles_are_patients() {
        assert_eq!(Role::parse("doctor"), Role::Doctor);
        assert_eq!(Role::parse(" Doctor "), Role::Doctor);
        assert_eq!(Role::parse("patient"), Role::Patient);
        assert_eq!(Role::parse("admin"), Role::Patient);
        assert_eq!(Role::parse(""), Role::Patient);
    }

    #[test]
    fn linked_record_requires_non_blank_id() {
        let user = AuthUser::new("u1");
        let mut enriched = EnrichedUser::new(user, RoleRecord::default());
        assert!(!enriched.has_linked_record());
        enriched.patient_id = Some(" ".into());
        assert!(!enriched.has_linked_record());
        enriched.patient_id = Some("p-9".into());
        assert!(enriched.has_linked_record());
    }

    #[test]
    fn enriched_user_serializes_flat() {
        let enriched = EnrichedUser::new(
            AuthUser::new("u1"),
            RoleRecord {
                role: Role::Doctor,
                patient_id: None,
            },
        );
        assert_eq!(
            serde_json::to_value(&enriched).unwrap(),
            serde_json::json!({"id": "u1", "email": null, "role": "doctor", "patient_id": null})
        );
    }

    #[cfg(feature = "client")]
    mod resolver {
        use super::*;
        use std::sync::atomic::{AtomicUsize, Ordering};

        enum Behaviour {
            Row(RoleRecord),
            Missing,
            Fail,
            Hang,
        }

        struct FakeStore {
            behaviour: Behaviour,
            calls: AtomicUsize,
        }

        impl FakeStore {
            fn new(behaviour: Behaviour) -> Self {
                Self {
                    behaviour,
                    calls: AtomicUsize::new(0),
                }
            }
        }

        impl RoleStore for FakeStore {
            async fn fetch_role(&self, _user_id: &str) -> Result<Option<RoleRecord>, AuthError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                match &self.behaviour {
                    Behaviour::Row(record) => Ok(Some(record.clone())),
                    Behaviour::Missing => Ok(None),
                    Behaviour::Fail => Err(AuthError::Http("connection refused".into())),
                    Behaviour::Hang => {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(None)
                    }
                }
            }
        }

        fn resolver(behaviour: Behaviour) -> RoleResolver<FakeStore> {
            RoleResolver::new(FakeStore::new(behaviour), Duration::from_secs(5))
        }

        #[tokio::test]
        async fn stored_role_is_used() {
            let resolver = resolver(Behaviour::Row(RoleRecord {
                role: Role::Doctor,
                patient_id: Some("p-1".into()),
            }));
            let enriched = resolver.resolve(&AuthUser::new("u1")).await;
            assert!(enriched.is_doctor());
            assert_eq!(enriched.patient_id.as_deref(), Some("p-1"));
            assert_eq!(resolver.store().calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn missing_row_and_errors_fall_back_to_patient() {
            for behaviour in [Behaviour::Missing, Behaviour::Fail] {
                let enriched = resolver(behaviour).resolve(&AuthUser::new("u1")).await;
                assert_eq!(enriched.role, Role::Patient);
                assert_eq!(enriched.patient_id, None);
            }
        }

        #[tokio::test(start_paused = true)]
        async fn timeout_falls_back_to_patient() {
            let enriched = resolver(Behaviour::Hang).resolve(&AuthUser::new("u1")).await;
            assert_eq!(enriched.role, Role::Patient);
            assert_eq!(enriched.patient_id, None);
        }
    }
}
