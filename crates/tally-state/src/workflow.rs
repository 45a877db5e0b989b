//! # Transition Algorithm
//!
//! [`check_transition`] is the single interpreter of every workflow table.
//! Evaluation order:
//!
//! 1. `from == to` is a no-op and always allowed.
//! 2. An ordinary edge is allowed, unless the target requires provenance
//!    and the context carries no source.
//! 3. A declared escape hatch is allowed when the context carries both the
//!    matching system action tag and a source.
//! 4. A declared auto-approve edge is allowed when the context sets
//!    `auto_approve` and carries a source.
//! 5. The legacy bypass flag allows rank downgrades only, never a move
//!    into an approval state.
//! 6. Everything else is illegal.

use std::fmt;
use std::str::FromStr;

use tally_core::EntityKind;

use crate::context::{RegulatoryTransitionContext, SystemAction};
use crate::error::TransitionError;
use crate::journal::JournalStatus;
use crate::payout::PayoutStatus;
use crate::period::PeriodStatus;
use crate::regulatory_rule::RuleStatus;

/// A narrow edge outside the ordinary table, usable only by a tagged
/// system operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeHatch<S: 'static> {
    pub action: SystemAction,
    pub from: S,
    pub to: S,
}

/// A status enum with a static transition table.
pub trait WorkflowStatus:
    Copy + Eq + fmt::Debug + fmt::Display + FromStr<Err = TransitionError> + 'static
{
    /// Display name used in errors and audit records.
    const WORKFLOW: &'static str;

    fn all() -> &'static [Self];

    /// States a record may be created in.
    fn initial_states() -> &'static [Self];

    /// Ordinary targets reachable from `self`.
    fn allowed_targets(self) -> &'static [Self];

    /// Position in the workflow. Lower means earlier.
    fn rank(self) -> u8;

    /// Entering this state needs a provenance source.
    fn requires_provenance(self) -> bool {
        false
    }

    /// Approval-type state that legacy bypass may never reach.
    fn is_approval(self) -> bool {
        false
    }

    fn escape_hatches() -> &'static [EscapeHatch<Self>] {
        &[]
    }

    fn auto_approve_edges() -> &'static [(Self, Self)] {
        &[]
    }

    /// Columns that may accompany a status change along `from → to`.
    /// `None` leaves the payload unrestricted.
    fn edge_fields(_from: Self, _to: Self) -> Option<&'static [&'static str]> {
        None
    }

    fn can_transition_to(self, to: Self) -> bool {
        self.allowed_targets().contains(&to)
    }

    fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }
}

/// Which rule admitted a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPath {
    Unchanged,
    Standard,
    EscapeHatch(SystemAction),
    AutoApprove,
    /// Admitted only because of the legacy bypass flag. Callers should log.
    LegacyBypass,
}

/// Decide whether `from → to` is admissible under the given context.
pub fn check_transition<S: WorkflowStatus>(
    from: S,
    to: S,
    ctx: Option<&RegulatoryTransitionContext>,
) -> Result<TransitionPath, TransitionError> {
    if from == to {
        return Ok(TransitionPath::Unchanged);
    }
    let has_source = ctx.is_some_and(RegulatoryTransitionContext::has_source);

    if from.can_transition_to(to) {
        if to.requires_provenance() && !has_source {
            return Err(TransitionError::MissingProvenance {
                workflow: S::WORKFLOW,
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        return Ok(TransitionPath::Standard);
    }

    if let Some(ctx) = ctx {
        if has_source {
            if let Some(action) = ctx.system_action {
                let hatch = S::escape_hatches()
                    .iter()
                    .any(|h| h.action == action && h.from == from && h.to == to);
                if hatch {
                    return Ok(TransitionPath::EscapeHatch(action));
                }
            }
            if ctx.auto_approve && S::auto_approve_edges().contains(&(from, to)) {
                return Ok(TransitionPath::AutoApprove);
            }
        }
        if ctx.bypass {
            if to.is_approval() {
                return Err(TransitionError::BypassRejected {
                    workflow: S::WORKFLOW,
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            if to.rank() < from.rank() {
                return Ok(TransitionPath::LegacyBypass);
            }
        }
    }

    Err(TransitionError::IllegalTransition {
        workflow: S::WORKFLOW,
        from: from.to_string(),
        to: to.to_string(),
        allowed: names(from.allowed_targets()),
    })
}

/// Check that a newly created record starts in an initial state.
pub fn check_initial<S: WorkflowStatus>(status: S) -> Result<(), TransitionError> {
    if S::initial_states().contains(&status) {
        Ok(())
    } else {
        Err(TransitionError::InvalidInitialStatus {
            workflow: S::WORKFLOW,
            status: status.to_string(),
            allowed: names(S::initial_states()),
        })
    }
}

fn names<S: fmt::Display>(states: &[S]) -> Vec<String> {
    states.iter().map(ToString::to_string).collect()
}

// ─── Dynamic dispatch ───────────────────────────────────────────────

/// The workflow governing an entity's status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workflow {
    RegulatoryRule,
    Payout,
    JournalEntry,
    AccountingPeriod,
}

impl Workflow {
    pub fn all() -> &'static [Workflow] {
        &[
            Self::RegulatoryRule,
            Self::Payout,
            Self::JournalEntry,
            Self::AccountingPeriod,
        ]
    }

    pub fn for_entity(entity: EntityKind) -> Option<Workflow> {
        match entity {
            EntityKind::RegulatoryRule => Some(Self::RegulatoryRule),
            EntityKind::Payout => Some(Self::Payout),
            EntityKind::JournalEntry => Some(Self::JournalEntry),
            EntityKind::AccountingPeriod => Some(Self::AccountingPeriod),
            _ => None,
        }
    }

    pub fn entity(self) -> EntityKind {
        match self {
            Self::RegulatoryRule => EntityKind::RegulatoryRule,
            Self::Payout => EntityKind::Payout,
            Self::JournalEntry => EntityKind::JournalEntry,
            Self::AccountingPeriod => EntityKind::AccountingPeriod,
        }
    }

    /// Column holding the workflow status.
    pub fn status_field(self) -> &'static str {
        "status"
    }

    /// Whether leaving the initial state freezes every non-transition write
    /// to the record and its child lines.
    pub fn locks_after_initial(self) -> bool {
        matches!(self, Self::Payout)
    }

    /// Child entity frozen together with the parent, and its foreign key.
    pub fn child(self) -> Option<(EntityKind, &'static str)> {
        match self {
            Self::Payout => Some((EntityKind::PayoutLine, "payout_id")),
            _ => None,
        }
    }

    /// Check `from → to`. The regulatory context only applies to
    /// regulatory rules and is ignored elsewhere.
    pub fn check(
        self,
        from: &str,
        to: &str,
        ctx: Option<&RegulatoryTransitionContext>,
    ) -> Result<TransitionPath, TransitionError> {
        match self {
            Self::RegulatoryRule => check_str::<RuleStatus>(from, to, ctx),
            Self::Payout => check_str::<PayoutStatus>(from, to, None),
            Self::JournalEntry => check_str::<JournalStatus>(from, to, None),
            Self::AccountingPeriod => check_str::<PeriodStatus>(from, to, None),
        }
    }

    /// Check the status a record is created with.
    pub fn check_initial(self, status: &str) -> Result<(), TransitionError> {
        match self {
            Self::RegulatoryRule => check_initial(status.parse::<RuleStatus>()?),
            Self::Payout => check_initial(status.parse::<PayoutStatus>()?),
            Self::JournalEntry => check_initial(status.parse::<JournalStatus>()?),
            Self::AccountingPeriod => check_initial(status.parse::<PeriodStatus>()?),
        }
    }

    /// The default status for records created without one.
    pub fn default_initial(self) -> &'static str {
        match self {
            Self::RegulatoryRule => RuleStatus::Draft.as_str(),
            Self::Payout => PayoutStatus::Draft.as_str(),
            Self::JournalEntry => JournalStatus::Draft.as_str(),
            Self::AccountingPeriod => PeriodStatus::Open.as_str(),
        }
    }

    /// Whether `status` is one of the states a record may be created in.
    pub fn is_initial(self, status: &str) -> bool {
        self.check_initial(status).is_ok()
    }

    /// Ordinary targets from `from`, as strings. Empty for unknown states.
    pub fn allowed_targets(self, from: &str) -> Vec<String> {
        match self {
            Self::RegulatoryRule => targets::<RuleStatus>(from),
            Self::Payout => targets::<PayoutStatus>(from),
            Self::JournalEntry => targets::<JournalStatus>(from),
            Self::AccountingPeriod => targets::<PeriodStatus>(from),
        }
    }

    /// Columns allowed alongside the status on edge `from → to`.
    pub fn edge_fields(self, from: &str, to: &str) -> Option<&'static [&'static str]> {
        match self {
            Self::RegulatoryRule => edge::<RuleStatus>(from, to),
            Self::Payout => edge::<PayoutStatus>(from, to),
            Self::JournalEntry => edge::<JournalStatus>(from, to),
            Self::AccountingPeriod => edge::<PeriodStatus>(from, to),
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity().as_str())
    }
}

fn check_str<S: WorkflowStatus>(
    from: &str,
    to: &str,
    ctx: Option<&RegulatoryTransitionContext>,
) -> Result<TransitionPath, TransitionError> {
    let from: S = from.parse()?;
    let to: S = to.parse()?;
    check_transition(from, to, ctx)
}

fn targets<S: WorkflowStatus>(from: &str) -> Vec<String> {
    from.parse::<S>()
        .map(|s| names(s.allowed_targets()))
        .unwrap_or_default()
}

fn edge<S: WorkflowStatus>(from: &str, to: &str) -> Option<&'static [&'static str]> {
    let from: S = from.parse().ok()?;
    let to: S = to.parse().ok()?;
    S::edge_fields(from, to)
}
