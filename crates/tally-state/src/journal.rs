//! # Journal Entry Workflow
//!
//! `DRAFT → POSTED → REVERSED`. Posting is additionally gated by the
//! double-entry balance check in the guard layer.

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::workflow::WorkflowStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalStatus {
    Draft,
    Posted,
    Reversed,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Posted => "POSTED",
            Self::Reversed => "REVERSED",
        }
    }
}

impl std::fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JournalStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "POSTED" => Ok(Self::Posted),
            "REVERSED" => Ok(Self::Reversed),
            other => Err(TransitionError::UnknownStatus {
                workflow: Self::WORKFLOW,
                status: other.to_string(),
            }),
        }
    }
}

impl WorkflowStatus for JournalStatus {
    const WORKFLOW: &'static str = "JournalEntry";

    fn all() -> &'static [Self] {
        &[Self::Draft, Self::Posted, Self::Reversed]
    }

    /// Entries may be created already posted; the balance check then
    /// rejects them for having no lines.
    fn initial_states() -> &'static [Self] {
        &[Self::Draft, Self::Posted]
    }

    fn allowed_targets(self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::Posted],
            Self::Posted => &[Self::Reversed],
            Self::Reversed => &[],
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
    fn posting_and_reversal() {
        use JournalStatus::*;
        assert!(check_transition(Draft, Posted, None).is_ok());
        assert!(check_transition(Posted, Reversed, None).is_ok());
        assert!(check_transition(Posted, Draft, None).is_err());
        assert!(check_transition(Reversed, Posted, None).is_err());
        assert!(Reversed.is_terminal());
    }
}
