//! Route guards. They only read an `AuthSnapshot`; no lookups happen here.

use serde::{Deserialize, Serialize};

use crate::session::AuthSnapshot;
use crate::GuardConfig;

/// What the router should do with a guarded route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", content = "to", rename_all = "snake_case")]
pub enum GuardOutcome {
    Render,
    /// Show a spinner; the session or role is not known yet.
    Loading,
    Redirect(String),
}

/// Any signed-in user may render.
pub fn require_session(auth: &AuthSnapshot, config: &GuardConfig) -> GuardOutcome {
    match auth {
        AuthSnapshot::Initializing => GuardOutcome::Loading,
        AuthSnapshot::Anonymous => GuardOutcome::Redirect(config.login_path.clone()),
        AuthSnapshot::Resolving { .. } | AuthSnapshot::Ready { .. } => GuardOutcome::Render,
    }
}

/// Only users whose resolved role is doctor may render.
pub fn require_doctor(auth: &AuthSnapshot, config: &GuardConfig) -> GuardOutcome {
    match auth {
        AuthSnapshot::Initializing | AuthSnapshot::Resolving { .. } => GuardOutcome::Loading,
        AuthSnapshot::Ready { user } if user.is_doctor() => GuardOutcome::Render,
        AuthSnapshot::Anonymous | AuthSnapshot::Ready { .. } => {
            GuardOutcome::Redirect(config.doctor_login_path.clone())
        }
    }
}

/// Patients must have a linked clinical record before their pages render.
pub fn require_linked_patient(auth: &AuthSnapshot, config: &GuardConfig) -> GuardOutcome {
    match auth {
        AuthSnapshot::Initializing | AuthSnapshot::Resolving { .. } => GuardOutcome::Loading,
        AuthSnapshot::Anonymous => GuardOutcome::Redirect(config.login_path.clone()),
        AuthSnapshot::Ready { user } if !user.is_doctor() && !user.has_linked_record() => {
            GuardOutcome::Redirect(config.link_record_path.clone())
        }
        AuthSnapshot::Ready { .. } => GuardOutcome::Render,
    }
}
