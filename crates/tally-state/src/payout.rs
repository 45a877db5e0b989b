//! # Payout Workflow
//!
//! `DRAFT → LOCKED → REPORTED`. Each edge names the only columns that may
//! be written together with the status. Once a payout leaves `DRAFT` the
//! record and its lines are frozen apart from the next transition.

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::workflow::WorkflowStatus;

const LOCK_FIELDS: &[&str] = &["status", "locked_at", "locked_by", "updated_at"];
const REPORT_FIELDS: &[&str] = &["status", "reported_at", "report_reference", "updated_at"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Draft,
    Locked,
    Reported,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Locked => "LOCKED",
            Self::Reported => "REPORTED",
        }
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PayoutStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "LOCKED" => Ok(Self::Locked),
            "REPORTED" => Ok(Self::Reported),
            other => Err(TransitionError::UnknownStatus {
                workflow: Self::WORKFLOW,
                status: other.to_string(),
            }),
        }
    }
}

impl WorkflowStatus for PayoutStatus {
    const WORKFLOW: &'static str = "Payout";

    fn all() -> &'static [Self] {
        &[Self::Draft, Self::Locked, Self::Reported]
    }

    fn initial_states() -> &'static [Self] {
        &[Self::Draft]
    }

    fn allowed_targets(self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::Locked],
            Self::Locked => &[Self::Reported],
            Self::Reported => &[],
        }
    }

    fn rank(self) -> u8 {
        self as u8
    }

    fn edge_fields(from: Self, to: Self) -> Option<&'static [&'static str]> {
        match (from, to) {
            (Self::Draft, Self::Locked) => Some(LOCK_FIELDS),
            (Self::Locked, Self::Reported) => Some(REPORT_FIELDS),
            _ => None,
        }
    }
}
