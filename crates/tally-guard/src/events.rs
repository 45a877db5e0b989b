//! # Operational Events
//!
//! Business occurrences derived from a write's before and after rows, for
//! downstream processing. Derivation is a pure function; persistence is an
//! upsert keyed by `(tenant_id, source_type, source_id, event_type)` with an
//! empty update, so replaying a write never stores a second event.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tally_core::{EntityKind, Filter, Payload, Record, RecordExt, TenantId, Timestamp};
use tally_store::{Store, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    InvoiceIssued,
    InvoicePaid,
    ExpenseApproved,
    ExpensePaid,
    BankTransactionImported,
    BankTransactionMatched,
    PayrollSigned,
    PayrollSubmitted,
    AssetActivated,
    AssetDisposed,
    InventoryLowStock,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvoiceIssued => "INVOICE_ISSUED",
            Self::InvoicePaid => "INVOICE_PAID",
            Self::ExpenseApproved => "EXPENSE_APPROVED",
            Self::ExpensePaid => "EXPENSE_PAID",
            Self::BankTransactionImported => "BANK_TRANSACTION_IMPORTED",
            Self::BankTransactionMatched => "BANK_TRANSACTION_MATCHED",
            Self::PayrollSigned => "PAYROLL_SIGNED",
            Self::PayrollSubmitted => "PAYROLL_SUBMITTED",
            Self::AssetActivated => "ASSET_ACTIVATED",
            Self::AssetDisposed => "ASSET_DISPOSED",
            Self::InventoryLowStock => "INVENTORY_LOW_STOCK",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalEvent {
    pub tenant_id: TenantId,
    pub source_type: EntityKind,
    pub source_id: String,
    pub event_type: EventType,
    pub payload: Value,
    pub occurred_at: Timestamp,
}

impl OperationalEvent {
    /// The idempotency key as a store filter.
    pub fn key_filter(&self) -> Filter {
        Filter::new()
            .eq("tenant_id", self.tenant_id.to_value())
            .eq("source_type", self.source_type.as_str())
            .eq("source_id", self.source_id.as_str())
            .eq("event_type", self.event_type.as_str())
    }

    pub fn to_payload(&self) -> Payload {
        Payload::new()
            .set("tenant_id", self.tenant_id.to_value())
            .set("source_type", self.source_type.as_str())
            .set("source_id", self.source_id.as_str())
            .set("event_type", self.event_type.as_str())
            .set("payload", self.payload.clone())
            .set("occurred_at", self.occurred_at.to_iso8601())
    }

    /// Store the event unless one with the same key exists.
    pub async fn persist(&self, store: &dyn Store) -> StoreResult<Record> {
        store
            .upsert(
                EntityKind::OperationalEvent,
                &self.key_filter(),
                &self.to_payload(),
                &Payload::new(),
            )
            .await
    }
}

fn status<'r>(row: Option<&'r Record>, field: &str) -> Option<&'r str> {
    row.and_then(|r| r.str_field(field))
}

/// `field` moved into one of `states` with this write.
fn entered(before: Option<&Record>, after: &Record, field: &str, states: &[&str]) -> bool {
    let now = after.str_field(field).is_some_and(|s| states.contains(&s));
    let was = status(before, field).is_some_and(|s| states.contains(&s));
    now && !was
}

/// `field` became non-null with this write.
fn newly_set(before: Option<&Record>, after: &Record, field: &str) -> bool {
    after.is_set(field) && !before.is_some_and(|b| b.is_set(field))
}

fn low_stock(row: &Record) -> bool {
    match (row.decimal_field("quantity"), row.decimal_field("reorder_level")) {
        (Some(qty), Some(level)) => qty <= level,
        _ => false,
    }
}

/// The event types a write produces, in a stable order.
pub fn triggered(entity: EntityKind, before: Option<&Record>, after: &Record) -> Vec<EventType> {
    let mut out = Vec::new();
    match entity {
        EntityKind::Invoice => {
            if entered(before, after, "status", &["ISSUED", "SENT"]) {
                out.push(EventType::InvoiceIssued);
            }
            if entered(before, after, "status", &["PAID"])
                || entered(before, after, "payment_status", &["PAID"])
            {
                out.push(EventType::InvoicePaid);
            }
        }
        EntityKind::Expense => {
            if entered(before, after, "status", &["APPROVED"]) {
                out.push(EventType::ExpenseApproved);
            }
            if entered(before, after, "status", &["PAID"]) {
                out.push(EventType::ExpensePaid);
            }
        }
        EntityKind::BankTransaction => {
            if before.is_none() {
                out.push(EventType::BankTransactionImported);
            }
            if entered(before, after, "status", &["MATCHED"]) || newly_set(before, after, "matched_at") {
                out.push(EventType::BankTransactionMatched);
            }
        }
        EntityKind::PayrollSubmission => {
            if newly_set(before, after, "signed_at") || entered(before, after, "status", &["SIGNED"]) {
                out.push(EventType::PayrollSigned);
            }
            if entered(before, after, "status", &["SUBMITTED"]) {
                out.push(EventType::PayrollSubmitted);
            }
        }
        EntityKind::Asset => {
            if entered(before, after, "status", &["ACTIVE"]) {
                out.push(EventType::AssetActivated);
            }
            if entered(before, after, "status", &["DISPOSED"]) {
                out.push(EventType::AssetDisposed);
            }
        }
        EntityKind::InventoryItem => {
            if low_stock(after) && !before.is_some_and(low_stock) {
                out.push(EventType::InventoryLowStock);
            }
        }
        _ => {}
    }
    out
}

/// Derive the events for a completed write. Deletes and rows without a
/// tenant or id produce none.
pub fn derive(
    entity: EntityKind,
    before: Option<&Record>,
    after: Option<&Record>,
    occurred_at: Timestamp,
) -> Vec<OperationalEvent> {
    let Some(after) = after else {
        return Vec::new();
    };
    let (Some(tenant_id), Some(source_id)) = (after.tenant_id(), after.record_id()) else {
        return Vec::new();
    };
    triggered(entity, before, after)
        .into_iter()
        .map(|event_type| {
            let mut payload = json!({
                "status": after.get("status").cloned().unwrap_or(Value::Null),
                "previous_status": before.and_then(|b| b.get("status")).cloned().unwrap_or(Value::Null),
            });
            if event_type == EventType::InventoryLowStock {
                payload["quantity"] = after.get("quantity").cloned().unwrap_or(Value::Null);
                payload["reorder_level"] = after.get("reorder_level").cloned().unwrap_or(Value::Null);
            }
            OperationalEvent {
                tenant_id: tenant_id.clone(),
                source_type: entity,
                source_id: source_id.as_str().to_string(),
                event_type,
                payload,
                occurred_at,
            }
        })
        .collect()
}
