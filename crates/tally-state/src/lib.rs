//! # tally-state — Status Transition Engines
//!
//! Every workflow entity owns a status column whose legal changes are a
//! static table `from → {to…}`. This crate holds those tables and the one
//! algorithm that interprets them.
//!
//! ## Workflows
//!
//! - **Regulatory rule** (`regulatory_rule.rs`):
//!   `Draft → PendingReview → Approved → Published → Deprecated`, with
//!   `Rejected` and review loops. Publication requires provenance; two
//!   system escape hatches allow narrow downgrades.
//!
//! - **Payout** (`payout.rs`): `Draft → Locked → Reported`. Each edge
//!   restricts which columns may be written alongside the status.
//!
//! - **Journal entry** (`journal.rs`): `Draft → Posted → Reversed`.
//!
//! - **Accounting period** (`period.rs`):
//!   `Future → Open ⇄ SoftClose → Closed → Locked`, with reopen from
//!   `Closed`. `Closed` and `Locked` block writes dated inside the period.
//!
//! ## Design
//!
//! Status values arrive from storage as strings, so typestate (one Rust type
//! per state) buys nothing here. Each workflow is an enum implementing
//! [`WorkflowStatus`]; [`check_transition`] is generic over it, and
//! [`Workflow`] dispatches from an `EntityKind` to the right enum without
//! string matching on entity names.

pub mod context;
pub mod error;
pub mod journal;
pub mod payout;
pub mod period;
pub mod regulatory_rule;
pub mod workflow;

pub use context::{RegulatoryTransitionContext, SystemAction};
pub use error::TransitionError;
pub use journal::JournalStatus;
pub use payout::PayoutStatus;
pub use period::PeriodStatus;
pub use regulatory_rule::RuleStatus;
pub use workflow::{check_transition, EscapeHatch, TransitionPath, Workflow, WorkflowStatus};
