//! # tally-guard — Guarded Data Access
//!
//! The choke point between application code and the shared store. Every
//! read is scoped to the caller's tenant, and every write is rewritten,
//! validated and possibly vetoed before it reaches storage.
//!
//! ## Request Flow
//!
//! ```text
//! context::run(ctx, ..)
//!   └─ GuardedStore::update(entity, filter, payload)
//!        ├─ tenant::scope_filter / scope_update
//!        ├─ fetch current row (NotFound outside the tenant)
//!        ├─ PeriodLockGuard        → PeriodLocked
//!        ├─ ImmutabilityGuard      → ImmutabilityViolation
//!        ├─ StatusTransitionGuard  → IllegalStatusTransition, BulkStatusChangeNotAllowed
//!        ├─ LedgerGuard            → LedgerLineInvalidAmount, LedgerUnbalanced
//!        ├─ CashGuard              → CashDayClosed, CashBalanceWouldGoNegative
//!        ├─ Store::update
//!        └─ SideEffectQueue ← AuditRecord, OperationalEvent
//! ```
//!
//! ## Failure Policy
//!
//! - No tenant in context: no implicit scoping. Explicit caller filters
//!   still apply.
//! - Period and cash checks that cannot resolve a tenant or date pass the
//!   write.
//! - Audit and event persistence failures are logged and counted, never
//!   returned to the caller.
//! - Guard reads and the write are not atomic; concurrent writers can race
//!   between the check and the commit.

pub mod audit;
pub mod cash;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod guard;
pub mod immutability;
pub mod ledger;
pub mod metrics;
pub mod period;
pub mod queue;
pub mod registry;
pub mod telemetry;
pub mod tenant;
pub mod transitions;

pub use audit::{compute_checksum, Attribution, AuditAction, AuditChanges, AuditRecord};
pub use client::{default_guards, GuardedStore};
pub use config::GuardConfig;
pub use context::{AuditContext, RequestContext, TenantContext};
pub use error::{GuardError, GuardResult};
pub use events::{EventType, OperationalEvent};
pub use guard::{BulkOperation, BulkRequest, Operation, WriteGuard, WriteRequest};
pub use queue::{SideEffect, SideEffectQueue};
