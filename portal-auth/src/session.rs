//! Session state and the role-enrichment handshake.
//!
//! Every sign-in or sign-out bumps the store version, and every role lookup
//! carries a ticket with a monotonic sequence number. A response is applied
//! only if its ticket is the latest one issued for the current version, so a
//! late reply for a previous user or an earlier request is dropped.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::roles::EnrichedUser;

#[cfg(feature = "client")]
use std::sync::RwLock;

#[cfg(feature = "client")]
use crate::roles::{RoleResolver, RoleStore};
#[cfg(feature = "client")]
use crate::AuthError;

/// User as reported by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl AuthUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }
}

/// Tokens issued by the identity provider for one signed-in user.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user: AuthUser,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True once `now` is within `margin` of expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What the UI may know about authentication at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthSnapshot {
    /// The persisted session has not been restored yet.
    Initializing,
    Anonymous,
    /// Signed in, role lookup still pending.
    Resolving { user: AuthUser },
    Ready { user: EnrichedUser },
}

/// Proof that a role lookup was requested; hand it back with the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentTicket {
    sequence: u64,
    version: u64,
    user: AuthUser,
}

impl EnrichmentTicket {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn user(&self) -> &AuthUser {
        &self.user
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    restored: bool,
    session: Option<Session>,
    enriched: Option<EnrichedUser>,
    version: u64,
    issued: u64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of restoring a persisted session at startup.
    pub fn finish_restore(&mut self, session: Option<Session>) {
        match session {
            Some(session) => self.sign_in(session),
            None => {
                self.restored = true;
                self.version += 1;
            }
        }
    }

    pub fn sign_in(&mut self, session: Session) {
        tracing::info!(user_id = %session.user.id, "Session started");
        self.restored = true;
        self.version += 1;
        self.session = Some(session);
        self.enriched = None;
    }

    pub fn sign_out(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(user_id = %session.user.id, "Session ended");
        }
        self.restored = true;
        self.version += 1;
        self.enriched = None;
    }

    /// Swap in refreshed tokens. The role is kept when the user is unchanged.
    pub fn replace_tokens(&mut self, session: Session) {
        match &self.session {
            Some(current) if current.user.id == session.user.id => {
                self.session = Some(session);
            }
            _ => self.sign_in(session),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn enriched_user(&self) -> Option<&EnrichedUser> {
        self.enriched.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        if !self.restored {
            return AuthSnapshot::Initializing;
        }
        match (&self.session, &self.enriched) {
            (None, _) => AuthSnapshot::Anonymous,
            (Some(_), Some(enriched)) => AuthSnapshot::Ready {
                user: enriched.clone(),
            },
            (Some(session), None) => AuthSnapshot::Resolving {
                user: session.user.clone(),
            },
        }
    }

    /// Start a role lookup for the current user. `None` when signed out.
    pub fn begin_enrichment(&mut self) -> Option<EnrichmentTicket> {
        let session = self.session.as_ref()?;
        self.issued += 1;
        Some(EnrichmentTicket {
            sequence: self.issued,
            version: self.version,
            user: session.user.clone(),
        })
    }

    /// Apply a lookup result. Returns `false` when the ticket is stale.
    pub fn complete_enrichment(
        &mut self,
        ticket: EnrichmentTicket,
        enriched: EnrichedUser,
    ) -> bool {
        let current_user = self.session.as_ref().map(|session| session.user.id.as_str());
        let is_latest = ticket.version == self.version && ticket.sequence == self.issued;
        let same_user = current_user == Some(ticket.user.id.as_str())
            && enriched.user.id == ticket.user.id;

        if !is_latest || !same_user {
            tracing::warn!(
                user_id = %ticket.user.id,
                sequence = ticket.sequence,
                latest = self.issued,
                "Discarding stale role lookup"
            );
            return false;
        }

        self.enriched = Some(enriched);
        true
    }
}

/// Resolve the current user's role and apply it if still relevant.
///
/// The lock is only held to issue and to redeem the ticket, so the store can
/// be signed out or switched to another user while the lookup is in flight.
/// Returns `Ok(false)` when there was no session or the result went stale.
#[cfg(feature = "client")]
pub async fn enrich_session<S: RoleStore>(
    sessions: &RwLock<SessionStore>,
    resolver: &RoleResolver<S>,
) -> Result<bool, AuthError> {
    let ticket = sessions
        .write()
        .map_err(|_| AuthError::LockPoisoned)?
        .begin_enrichment();
    let Some(ticket) = ticket else {
        return Ok(false);
    };

    let enriched = resolver.resolve(ticket.user()).await;

    let mut store = sessions.write().map_err(|_| AuthError::LockPoisoned)?;
    Ok(store.complete_enrichment(ticket, enriched))
}
