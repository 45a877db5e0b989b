//! # Immutability Guards
//!
//! Each rule names the fields that stay writable once a record is locked
//! and the condition that locks it. An update is refused when it touches a
//! field outside the mutable set and the current row is locked; a delete is
//! refused whenever the row is locked.
//!
//! Entities locked unconditionally with no mutable fields (calculation
//! snapshots, audit logs, cash day closes) refuse every update and delete,
//! and their bulk forms are refused without a lookup. Line items inherit
//! their parent's lock, including on create.

use async_trait::async_trait;
use serde_json::Value;
use tally_core::{EntityKind, Filter, Payload, Record, RecordExt, TenantId};
use tally_store::Store;

use crate::error::{GuardError, GuardResult};
use crate::guard::{BulkOperation, BulkRequest, Operation, WriteGuard, WriteRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockCondition {
    /// Locked while `field` holds one of `states`.
    StatusIn {
        field: &'static str,
        states: &'static [&'static str],
    },
    /// Locked once `field` is non-null.
    FieldSet(&'static str),
    /// Locked when any of the conditions holds.
    AnyOf(&'static [LockCondition]),
    /// Always locked.
    Always,
    /// Locked when the parent row is locked under its own rule.
    Parent {
        foreign_key: &'static str,
        parent: EntityKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmutabilityRule {
    pub entity: EntityKind,
    pub mutable_fields: &'static [&'static str],
    pub locked_when: LockCondition,
}

impl ImmutabilityRule {
    /// No field is ever writable and the lock is unconditional.
    pub fn is_append_only(&self) -> bool {
        self.mutable_fields.is_empty() && self.locked_when == LockCondition::Always
    }

    /// Keys of a write outside the mutable set, sorted.
    pub fn disallowed(&self, keys: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut out: Vec<String> = keys
            .into_iter()
            .filter(|k| !self.mutable_fields.contains(&k.as_str()))
            .collect();
        out.sort();
        out
    }
}

const INVOICE_ISSUED_STATES: &[&str] = &[
    "ISSUED",
    "SENT",
    "PARTIALLY_PAID",
    "PAID",
    "OVERDUE",
    "CANCELLED",
    "CREDITED",
];

pub static IMMUTABILITY_RULES: &[ImmutabilityRule] = &[
    // `status` is deliberately absent: issued invoices change through
    // credit notes, not by editing the status back.
    ImmutabilityRule {
        entity: EntityKind::Invoice,
        mutable_fields: &[
            "payment_status",
            "paid_amount",
            "paid_at",
            "fiscal_status",
            "fiscal_reference",
            "fiscalized_at",
            "email_sent_at",
            "pdf_url",
            "internal_note",
            "updated_at",
        ],
        locked_when: LockCondition::StatusIn {
            field: "status",
            states: INVOICE_ISSUED_STATES,
        },
    },
    ImmutabilityRule {
        entity: EntityKind::InvoiceLine,
        mutable_fields: &[],
        locked_when: LockCondition::Parent {
            foreign_key: "invoice_id",
            parent: EntityKind::Invoice,
        },
    },
    ImmutabilityRule {
        entity: EntityKind::PayrollSubmission,
        mutable_fields: &[
            "submission_status",
            "submitted_at",
            "response_reference",
            "response_message",
            "updated_at",
        ],
        locked_when: LockCondition::AnyOf(&[
            LockCondition::FieldSet("signed_at"),
            LockCondition::StatusIn {
                field: "status",
                states: &["SIGNED", "SUBMITTED", "ACCEPTED"],
            },
        ]),
    },
    ImmutabilityRule {
        entity: EntityKind::PayrollSubmissionLine,
        mutable_fields: &[],
        locked_when: LockCondition::Parent {
            foreign_key: "payroll_submission_id",
            parent: EntityKind::PayrollSubmission,
        },
    },
    ImmutabilityRule {
        entity: EntityKind::Evidence,
        mutable_fields: &["description", "tags", "updated_at"],
        locked_when: LockCondition::FieldSet("content_hash"),
    },
    ImmutabilityRule {
        entity: EntityKind::CalculationSnapshot,
        mutable_fields: &[],
        locked_when: LockCondition::Always,
    },
    ImmutabilityRule {
        entity: EntityKind::JournalEntry,
        mutable_fields: &["status", "reversed_at", "reversed_by_id", "updated_at"],
        locked_when: LockCondition::StatusIn {
            field: "status",
            states: &["POSTED", "REVERSED"],
        },
    },
    ImmutabilityRule {
        entity: EntityKind::JournalLine,
        mutable_fields: &[],
        locked_when: LockCondition::Parent {
            foreign_key: "journal_entry_id",
            parent: EntityKind::JournalEntry,
        },
    },
    ImmutabilityRule {
        entity: EntityKind::CashDayClose,
        mutable_fields: &[],
        locked_when: LockCondition::Always,
    },
    ImmutabilityRule {
        entity: EntityKind::AuditLog,
        mutable_fields: &[],
        locked_when: LockCondition::Always,
    },
];

pub fn rule_for(entity: EntityKind) -> Option<&'static ImmutabilityRule> {
    IMMUTABILITY_RULES.iter().find(|r| r.entity == entity)
}

/// Evaluate a non-parent condition on a row. Returns a description of the
/// lock state when locked.
fn local_lock(condition: &LockCondition, record: &Record) -> Option<String> {
    match condition {
        LockCondition::StatusIn { field, states } => record
            .str_field(field)
            .filter(|s| states.contains(s))
            .map(str::to_string),
        LockCondition::FieldSet(field) => record
            .is_set(field)
            .then(|| record.str_field("status").map(str::to_string).unwrap_or_else(|| format!("{field} set"))),
        LockCondition::AnyOf(conditions) => conditions.iter().find_map(|c| local_lock(c, record)),
        LockCondition::Always => Some("IMMUTABLE".to_string()),
        LockCondition::Parent { .. } => None,
    }
}

/// Whether the parent `parent_id` of `entity` is locked.
async fn parent_lock(
    store: &dyn Store,
    parent: EntityKind,
    parent_id: &Value,
    tenant: Option<&TenantId>,
) -> GuardResult<Option<String>> {
    let Some(parent_rule) = rule_for(parent) else {
        return Ok(None);
    };
    let mut filter = Filter::by_id(parent_id.clone());
    if let Some(t) = tenant {
        filter = filter.eq("tenant_id", t.to_value());
    }
    let Some(row) = store.find_unique(parent, &filter).await? else {
        return Ok(None);
    };
    Ok(local_lock(&parent_rule.locked_when, &row).map(|s| format!("{parent} {s}")))
}

/// Whether a row is locked under `rule`.
pub async fn lock_state(
    store: &dyn Store,
    rule: &ImmutabilityRule,
    record: &Record,
    tenant: Option<&TenantId>,
) -> GuardResult<Option<String>> {
    match rule.locked_when {
        LockCondition::Parent { foreign_key, parent } => match record.get(foreign_key) {
            Some(id) if !id.is_null() => {
                let tenant = tenant.cloned().or_else(|| record.tenant_id());
                parent_lock(store, parent, id, tenant.as_ref()).await
            }
            _ => Ok(None),
        },
        ref other => Ok(local_lock(other, record)),
    }
}

fn violation(entity: EntityKind, fields: Vec<String>, current_status: Option<String>) -> GuardError {
    GuardError::ImmutabilityViolation {
        entity,
        fields,
        current_status,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImmutabilityGuard;

impl ImmutabilityGuard {
    async fn check_create(
        &self,
        store: &dyn Store,
        rule: &ImmutabilityRule,
        entity: EntityKind,
        payload: &Payload,
        tenant: Option<&TenantId>,
    ) -> GuardResult<()> {
        if let LockCondition::Parent { foreign_key, parent } = rule.locked_when {
            if let Some(parent_id) = payload.set_value(foreign_key).filter(|v| !v.is_null()) {
                if let Some(state) = parent_lock(store, parent, parent_id, tenant).await? {
                    let fields = payload.keys().map(str::to_string).collect();
                    return Err(violation(entity, fields, Some(state)));
                }
            }
        }
        Ok(())
    }

    async fn check_row(
        &self,
        store: &dyn Store,
        rule: &ImmutabilityRule,
        operation: Operation,
        row: &Record,
        payload: Option<&Payload>,
        tenant: Option<&TenantId>,
    ) -> GuardResult<()> {
        match operation {
            Operation::Create => Ok(()),
            Operation::Update => {
                let Some(payload) = payload else {
                    return Ok(());
                };
                let disallowed = rule.disallowed(payload.keys().map(str::to_string));
                if disallowed.is_empty() {
                    return Ok(());
                }
                if let Some(state) = lock_state(store, rule, row, tenant).await? {
                    return Err(violation(rule.entity, disallowed, Some(state)));
                }
                // Re-parenting a line under a locked parent.
                if let LockCondition::Parent { foreign_key, parent } = rule.locked_when {
                    if let Some(new_parent) = payload.set_value(foreign_key).filter(|v| !v.is_null()) {
                        if let Some(state) = parent_lock(store, parent, new_parent, tenant).await? {
                            return Err(violation(rule.entity, disallowed, Some(state)));
                        }
                    }
                }
                Ok(())
            }
            Operation::Delete => match lock_state(store, rule, row, tenant).await? {
                Some(state) => Err(violation(rule.entity, Vec::new(), Some(state))),
                None => Ok(()),
            },
        }
    }
}

#[async_trait]
impl WriteGuard for ImmutabilityGuard {
    fn name(&self) -> &'static str {
        "immutability"
    }

    async fn check(&self, store: &dyn Store, req: &WriteRequest<'_>) -> GuardResult<()> {
        let Some(rule) = rule_for(req.entity) else {
            return Ok(());
        };
        match req.operation {
            Operation::Create => match req.payload {
                Some(payload) => self.check_create(store, rule, req.entity, payload, req.tenant).await,
                None => Ok(()),
            },
            op => {
                if rule.is_append_only() {
                    return Err(violation(req.entity, req.keys(), Some("IMMUTABLE".into())));
                }
                let Some(current) = req.current else {
                    return Ok(());
                };
                self.check_row(store, rule, op, current, req.payload, req.tenant).await
            }
        }
    }

    async fn check_bulk(&self, store: &dyn Store, req: &BulkRequest<'_>) -> GuardResult<()> {
        let Some(rule) = rule_for(req.entity) else {
            return Ok(());
        };
        match req.operation {
            BulkOperation::CreateMany => {
                for payload in req.payloads {
                    self.check_create(store, rule, req.entity, payload, req.tenant).await?;
                }
                Ok(())
            }
            BulkOperation::UpdateMany | BulkOperation::DeleteMany => {
                if rule.is_append_only() {
                    let fields = req
                        .payload
                        .map(|p| p.keys().map(str::to_string).collect())
                        .unwrap_or_default();
                    return Err(violation(req.entity, fields, Some("IMMUTABLE".into())));
                }
                let op = req.operation.element_operation();
                if let (Operation::Update, Some(payload)) = (op, req.payload) {
                    if rule.disallowed(payload.keys().map(str::to_string)).is_empty() {
                        return Ok(());
                    }
                }
                let rows = store.find_many(req.entity, &req.filter_or_all()).await?;
                for row in &rows {
                    self.check_row(store, rule, op, row, req.payload, req.tenant).await?;
                }
                Ok(())
            }
        }
    }
}
