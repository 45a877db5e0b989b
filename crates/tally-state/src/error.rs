//! Errors raised by the transition engines.

use thiserror::Error;

/// Why a status change was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// No edge, escape hatch, or bypass permits the change.
    #[error("illegal {workflow} transition: {from} -> {to} (allowed: {})", .allowed.join(", "))]
    IllegalTransition {
        workflow: &'static str,
        from: String,
        to: String,
        allowed: Vec<String>,
    },

    /// The edge exists but needs a provenance source that was not supplied.
    #[error("{workflow} transition {from} -> {to} requires an explicit source")]
    MissingProvenance {
        workflow: &'static str,
        from: String,
        to: String,
    },

    /// The legacy bypass flag was used to reach an approval state.
    #[error("legacy bypass cannot be used for {workflow} transition {from} -> {to}")]
    BypassRejected {
        workflow: &'static str,
        from: String,
        to: String,
    },

    /// A record was created in a status other than an initial one.
    #[error("{workflow} records must be created in one of: {} (got {status})", .allowed.join(", "))]
    InvalidInitialStatus {
        workflow: &'static str,
        status: String,
        allowed: Vec<String>,
    },

    /// The status string is not a member of the workflow.
    #[error("unknown {workflow} status: {status:?}")]
    UnknownStatus {
        workflow: &'static str,
        status: String,
    },
}

impl TransitionError {
    /// The target states that would have been accepted, when known.
    pub fn allowed_targets(&self) -> &[String] {
        match self {
            Self::IllegalTransition { allowed, .. } | Self::InvalidInitialStatus { allowed, .. } => {
                allowed
            }
            _ => &[],
        }
    }
}
