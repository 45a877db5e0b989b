//! # Ledger Invariants
//!
//! A journal line carries exactly one positive side: `debit > 0` and
//! `credit = 0`, or the reverse. A journal entry may only move into POSTED
//! when it has at least one line and its debit and credit totals are equal
//! to the cent, with no rounding tolerance.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tally_core::{EntityKind, Filter, Record, RecordExt, TenantId};
use tally_state::JournalStatus;
use tally_store::Store;

use crate::error::{GuardError, GuardResult};
use crate::guard::{BulkOperation, BulkRequest, Operation, WriteGuard, WriteRequest};

const ENTRY_FK: &str = "journal_entry_id";

fn amount(entity: EntityKind, row: &Record, field: &str) -> GuardResult<Decimal> {
    if !row.is_set(field) {
        return Ok(Decimal::ZERO);
    }
    row.decimal_field(field)
        .ok_or_else(|| GuardError::invalid(entity, field, "not a decimal amount"))
}

/// Validate the debit/credit pair of a journal line.
pub fn check_line(row: &Record) -> GuardResult<()> {
    let debit = amount(EntityKind::JournalLine, row, "debit")?;
    let credit = amount(EntityKind::JournalLine, row, "credit")?;
    let one_sided = (debit > Decimal::ZERO) != (credit > Decimal::ZERO);
    if debit < Decimal::ZERO || credit < Decimal::ZERO || !one_sided {
        return Err(GuardError::LedgerLineInvalidAmount { debit, credit });
    }
    Ok(())
}

/// Check that an entry can be posted: it has lines and they balance.
pub async fn check_balanced(
    store: &dyn Store,
    entry_id: &str,
    tenant: Option<&TenantId>,
) -> GuardResult<()> {
    let mut lines = Filter::new().eq(ENTRY_FK, entry_id);
    if let Some(t) = tenant {
        lines = lines.eq("tenant_id", t.to_value());
    }
    if store.count(EntityKind::JournalLine, &lines).await? == 0 {
        return Err(GuardError::LedgerEntryHasNoLines {
            entry_id: entry_id.to_string(),
        });
    }
    let debit_total = store.aggregate_sum(EntityKind::JournalLine, &lines, "debit").await?;
    let credit_total = store.aggregate_sum(EntityKind::JournalLine, &lines, "credit").await?;
    if debit_total != credit_total {
        tracing::debug!(entry_id, %debit_total, %credit_total, "unbalanced journal entry");
        return Err(GuardError::LedgerUnbalanced {
            debit_total,
            credit_total,
        });
    }
    Ok(())
}

fn posting(req: &WriteRequest<'_>) -> bool {
    let posted = JournalStatus::Posted.as_str();
    let target = req.payload.and_then(|p| p.set_value("status")).and_then(|v| v.as_str());
    let from = req.current.and_then(|c| c.str_field("status"));
    target == Some(posted) && from != Some(posted)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LedgerGuard;

#[async_trait]
impl WriteGuard for LedgerGuard {
    fn name(&self) -> &'static str {
        "ledger"
    }

    async fn check(&self, store: &dyn Store, req: &WriteRequest<'_>) -> GuardResult<()> {
        match (req.entity, req.operation) {
            (EntityKind::JournalLine, Operation::Create | Operation::Update) => check_line(&req.merged()),
            (EntityKind::JournalEntry, Operation::Create | Operation::Update) if posting(req) => {
                let merged = req.merged();
                let tenant = req.tenant.cloned().or_else(|| merged.tenant_id());
                match merged.record_id() {
                    Some(id) => check_balanced(store, id.as_str(), tenant.as_ref()).await,
                    // A fresh entry has no lines yet.
                    None => Err(GuardError::LedgerEntryHasNoLines {
                        entry_id: "(new)".to_string(),
                    }),
                }
            }
            _ => Ok(()),
        }
    }

    async fn check_bulk(&self, store: &dyn Store, req: &BulkRequest<'_>) -> GuardResult<()> {
        if req.entity != EntityKind::JournalLine {
            return Ok(());
        }
        match req.operation {
            BulkOperation::CreateMany => req
                .payloads
                .iter()
                .try_for_each(|p| check_line(&p.to_record())),
            BulkOperation::UpdateMany => {
                let Some(payload) = req.payload else {
                    return Ok(());
                };
                if !payload.contains("debit") && !payload.contains("credit") {
                    return Ok(());
                }
                for mut row in store.find_many(req.entity, &req.filter_or_all()).await? {
                    payload.apply_to(&mut row);
                    check_line(&row)?;
                }
                Ok(())
            }
            BulkOperation::DeleteMany => Ok(()),
        }
    }
}
