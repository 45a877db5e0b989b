//! # Regulatory Rule Workflow
//!
//! ```text
//! DRAFT ──► PENDING_REVIEW ──► APPROVED ──► PUBLISHED ──► DEPRECATED
//!   ▲            │   │            │  ▲          ┆ ┆
//!   └────────────┘   ▼            │  └╌╌╌╌╌╌╌╌╌╌┘ ┆  (ROLLBACK)
//!   ▲            REJECTED         ▼               ┆
//!   └────────────────┘       PENDING_REVIEW ◄╌╌╌╌╌┘  (QUARANTINE_DOWNGRADE)
//! ```
//!
//! Publication requires a provenance source. Dotted edges are escape
//! hatches: they need both the system action tag and a source.

use serde::{Deserialize, Serialize};

use crate::context::SystemAction;
use crate::error::TransitionError;
use crate::workflow::{EscapeHatch, WorkflowStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    Draft,
    PendingReview,
    Approved,
    Published,
    Deprecated,
    Rejected,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::PendingReview => "PENDING_REVIEW",
            Self::Approved => "APPROVED",
            Self::Published => "PUBLISHED",
            Self::Deprecated => "DEPRECATED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuleStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| TransitionError::UnknownStatus {
                workflow: Self::WORKFLOW,
                status: s.to_string(),
            })
    }
}

impl WorkflowStatus for RuleStatus {
    const WORKFLOW: &'static str = "RegulatoryRule";

    fn all() -> &'static [Self] {
        &[
            Self::Draft,
            Self::PendingReview,
            Self::Approved,
            Self::Published,
            Self::Deprecated,
            Self::Rejected,
        ]
    }

    fn initial_states() -> &'static [Self] {
        &[Self::Draft]
    }

    fn allowed_targets(self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::PendingReview],
            Self::PendingReview => &[Self::Approved, Self::Rejected, Self::Draft],
            Self::Approved => &[Self::Published, Self::PendingReview],
            Self::Published => &[Self::Deprecated],
            Self::Deprecated => &[],
            Self::Rejected => &[Self::Draft],
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Draft | Self::Rejected => 0,
            Self::PendingReview => 1,
            Self::Approved => 2,
            Self::Published => 3,
            Self::Deprecated => 4,
        }
    }

    fn requires_provenance(self) -> bool {
        matches!(self, Self::Published)
    }

    fn is_approval(self) -> bool {
        matches!(self, Self::Approved | Self::Published)
    }

    fn escape_hatches() -> &'static [EscapeHatch<Self>] {
        &[
            EscapeHatch {
                action: SystemAction::QuarantineDowngrade,
                from: Self::Published,
                to: Self::PendingReview,
            },
            EscapeHatch {
                action: SystemAction::Rollback,
                from: Self::Published,
                to: Self::Approved,
            },
        ]
    }

    fn auto_approve_edges() -> &'static [(Self, Self)] {
        &[(Self::Draft, Self::Approved)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RegulatoryTransitionContext;
    use crate::workflow::{check_transition, TransitionPath};

    fn sourced() -> RegulatoryTransitionContext {
        RegulatoryTransitionContext::with_source("rules-pipeline")
    }

    #[test]
    fn review_cycle_is_open_without_context() {
        use RuleStatus::*;
        for (from, to) in [
            (Draft, PendingReview),
            (PendingReview, Approved),
            (PendingReview, Rejected),
            (PendingReview, Draft),
            (Approved, PendingReview),
            (Published, Deprecated),
            (Rejected, Draft),
        ] {
            assert_eq!(
                check_transition(from, to, None).unwrap(),
                TransitionPath::Standard,
                "{from} -> {to}"
            );
        }
    }

    #[test]
    fn draft_cannot_jump_to_published() {
        let err = check_transition(RuleStatus::Draft, RuleStatus::Published, None).unwrap_err();
        match err {
            TransitionError::IllegalTransition { from, to, allowed, .. } => {
                assert_eq!(from, "DRAFT");
                assert_eq!(to, "PUBLISHED");
                assert_eq!(allowed, vec!["PENDING_REVIEW".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn publish_requires_source() {
        let err = check_transition(RuleStatus::Approved, RuleStatus::Published, None).unwrap_err();
        assert!(matches!(err, TransitionError::MissingProvenance { .. }));

        let ctx = RegulatoryTransitionContext::default();
        assert!(check_transition(RuleStatus::Approved, RuleStatus::Published, Some(&ctx)).is_err());

        assert_eq!(
            check_transition(RuleStatus::Approved, RuleStatus::Published, Some(&sourced())).unwrap(),
            TransitionPath::Standard
        );
    }

    #[test]
    fn quarantine_needs_tag_and_source() {
        let from = RuleStatus::Published;
        let to = RuleStatus::PendingReview;
        assert!(check_transition(from, to, None).is_err());
        assert!(check_transition(from, to, Some(&sourced())).is_err());

        let tag_only = RegulatoryTransitionContext {
            system_action: Some(SystemAction::QuarantineDowngrade),
            ..Default::default()
        };
        assert!(check_transition(from, to, Some(&tag_only)).is_err());

        let full = RegulatoryTransitionContext {
            system_action: Some(SystemAction::QuarantineDowngrade),
            ..sourced()
        };
        assert_eq!(
            check_transition(from, to, Some(&full)).unwrap(),
            TransitionPath::EscapeHatch(SystemAction::QuarantineDowngrade)
        );
    }

    #[test]
    fn rollback_tag_does_not_open_quarantine_edge() {
        let ctx = RegulatoryTransitionContext {
            system_action: Some(SystemAction::Rollback),
            ..sourced()
        };
        assert!(check_transition(RuleStatus::Published, RuleStatus::PendingReview, Some(&ctx)).is_err());
        assert_eq!(
            check_transition(RuleStatus::Published, RuleStatus::Approved, Some(&ctx)).unwrap(),
            TransitionPath::EscapeHatch(SystemAction::Rollback)
        );
    }

    #[test]
    fn bypass_allows_downgrades_only() {
        let ctx = RegulatoryTransitionContext {
            bypass: true,
            ..Default::default()
        };
        assert_eq!(
            check_transition(RuleStatus::Deprecated, RuleStatus::Draft, Some(&ctx)).unwrap(),
            TransitionPath::LegacyBypass
        );
        let err = check_transition(RuleStatus::Draft, RuleStatus::Approved, Some(&ctx)).unwrap_err();
        assert!(matches!(err, TransitionError::BypassRejected { .. }));
        let err = check_transition(RuleStatus::Published, RuleStatus::Approved, Some(&ctx)).unwrap_err();
        assert!(matches!(err, TransitionError::BypassRejected { .. }));
        // Upgrade to a non-approval state is still illegal.
        let err = check_transition(RuleStatus::Draft, RuleStatus::Deprecated, Some(&ctx)).unwrap_err();
        assert!(matches!(err, TransitionError::IllegalTransition { .. }));
    }

    #[test]
    fn auto_approve_needs_source() {
        let unsourced = RegulatoryTransitionContext {
            auto_approve: true,
            ..Default::default()
        };
        assert!(check_transition(RuleStatus::Draft, RuleStatus::Approved, Some(&unsourced)).is_err());

        let ctx = RegulatoryTransitionContext {
            auto_approve: true,
            ..sourced()
        };
        assert_eq!(
            check_transition(RuleStatus::Draft, RuleStatus::Approved, Some(&ctx)).unwrap(),
            TransitionPath::AutoApprove
        );
        assert!(check_transition(RuleStatus::Draft, RuleStatus::Published, Some(&ctx)).is_err());
    }

    #[test]
    fn deprecated_is_terminal() {
        assert!(RuleStatus::Deprecated.is_terminal());
        assert!(!RuleStatus::Published.is_terminal());
    }

    #[test]
    fn parse_round_trip() {
        for s in RuleStatus::all() {
            assert_eq!(s.as_str().parse::<RuleStatus>().unwrap(), *s);
        }
        assert!("published".parse::<RuleStatus>().is_err());
    }
}
