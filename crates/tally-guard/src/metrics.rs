//! # Guard Metrics
//!
//! Counters recorded through the `metrics` facade. Installing an exporter is
//! the embedding application's job; without one these are no-ops.

use tally_core::EntityKind;

use crate::error::GuardError;

/// Writes refused by a guard. Labels: `code`, `entity`.
pub const GUARD_REJECTIONS_TOTAL: &str = "tally_guard_rejections_total";

/// Audit records or events the worker failed to persist.
pub const AUDIT_PERSIST_FAILURES_TOTAL: &str = "tally_audit_persist_failures_total";

/// Side effects dropped because the queue was full or closed.
pub const SIDE_EFFECTS_DROPPED_TOTAL: &str = "tally_side_effects_dropped_total";

pub fn record_rejection(entity: EntityKind, err: &GuardError) {
    ::metrics::counter!(
        GUARD_REJECTIONS_TOTAL,
        "code" => err.code(),
        "entity" => entity.as_str()
    )
    .increment(1);
}

pub fn record_persist_failure(kind: &'static str) {
    ::metrics::counter!(AUDIT_PERSIST_FAILURES_TOTAL, "kind" => kind).increment(1);
}

pub fn record_dropped(kind: &'static str) {
    ::metrics::counter!(SIDE_EFFECTS_DROPPED_TOTAL, "kind" => kind).increment(1);
}
