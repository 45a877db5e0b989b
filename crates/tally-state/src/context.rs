//! # Regulatory Transition Context
//!
//! Request-scoped provenance for regulatory rule status changes. Absence
//! means the ordinary transition table applies and nothing else.

use serde::{Deserialize, Serialize};
use tally_core::UserId;

/// Enumerated system operations that may use an escape hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemAction {
    /// Pull a published rule back into review after a defect report.
    QuarantineDowngrade,
    /// Undo a publication, returning the rule to approved.
    Rollback,
}

impl std::fmt::Display for SystemAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::QuarantineDowngrade => "QUARANTINE_DOWNGRADE",
            Self::Rollback => "ROLLBACK",
        })
    }
}

/// Provenance attached to a regulatory rule transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulatoryTransitionContext {
    /// Where the change originates (pipeline name, ticket, import job).
    pub source: Option<String>,
    /// The user on whose behalf the system acts.
    pub actor_user_id: Option<UserId>,
    /// Legacy bypass. Honoured for downgrades only.
    #[serde(default)]
    pub bypass: bool,
    /// Lets a sourced pipeline approve without the review step.
    #[serde(default)]
    pub auto_approve: bool,
    /// Tag required to use an escape hatch.
    pub system_action: Option<SystemAction>,
}

impl RegulatoryTransitionContext {
    /// A context carrying only a source marker.
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }

    /// The source, if present and non-blank.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn has_source(&self) -> bool {
        self.source().is_some()
    }
}
