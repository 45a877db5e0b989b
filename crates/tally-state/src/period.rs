//! # Accounting Period Workflow
//!
//! ```text
//! FUTURE ─► OPEN ⇄ SOFT_CLOSE
//!            │  ▲      │
//!            ▼  │      ▼
//!            CLOSED ◄──┘
//!               │
//!               ▼
//!            LOCKED
//! ```
//!
//! `CLOSED` and `LOCKED` periods block writes dated inside them. `LOCKED`
//! is terminal; a closed period may still be reopened.

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::workflow::WorkflowStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodStatus {
    Future,
    Open,
    SoftClose,
    Closed,
    Locked,
}

impl PeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Future => "FUTURE",
            Self::Open => "OPEN",
            Self::SoftClose => "SOFT_CLOSE",
            Self::Closed => "CLOSED",
            Self::Locked => "LOCKED",
        }
    }

    /// Whether writes dated inside the period are refused.
    pub fn blocks_writes(&self) -> bool {
        matches!(self, Self::Closed | Self::Locked)
    }

    /// Status strings that block writes, for building store filters.
    pub fn blocking() -> &'static [&'static str] {
        &["CLOSED", "LOCKED"]
    }
}

impl std::fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PeriodStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FUTURE" => Ok(Self::Future),
            "OPEN" => Ok(Self::Open),
            "SOFT_CLOSE" => Ok(Self::SoftClose),
            "CLOSED" => Ok(Self::Closed),
            "LOCKED" => Ok(Self::Locked),
            other => Err(TransitionError::UnknownStatus {
                workflow: Self::WORKFLOW,
                status: other.to_string(),
            }),
        }
    }
}

impl WorkflowStatus for PeriodStatus {
    const WORKFLOW: &'static str = "AccountingPeriod";

    fn all() -> &'static [Self] {
        &[
            Self::Future,
            Self::Open,
            Self::SoftClose,
            Self::Closed,
            Self::Locked,
        ]
    }

    fn initial_states() -> &'static [Self] {
        &[Self::Future, Self::Open]
    }

    fn allowed_targets(self) -> &'static [Self] {
        match self {
            Self::Future => &[Self::Open],
            Self::Open => &[Self::SoftClose, Self::Closed],
            Self::SoftClose => &[Self::Open, Self::Closed],
            Self::Closed => &[Self::Open, Self::Locked],
            Self::Locked => &[],
        }
    }

    fn rank(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::check_transition;

    #[test]
    fn close_and_reopen() {
        use PeriodStatus::*;
        assert!(check_transition(Open, SoftClose, None).is_ok());
        assert!(check_transition(SoftClose, Closed, None).is_ok());
        assert!(check_transition(Closed, Open, None).is_ok());
        assert!(check_transition(Closed, Locked, None).is_ok());
        assert!(check_transition(Locked, Open, None).is_err());
        assert!(check_transition(Future, Closed, None).is_err());
    }

    #[test]
    fn blocking_states() {
        let blocking: Vec<_> = PeriodStatus::all()
            .iter()
            .filter(|s| s.blocks_writes())
            .map(|s| s.as_str())
            .collect();
        assert_eq!(blocking, PeriodStatus::blocking());
    }
}
