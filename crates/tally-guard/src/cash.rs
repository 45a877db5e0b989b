//! # Cash Invariants
//!
//! The running cash balance of a tenant is `Σ CashIn.amount − Σ CashOut.amount`
//! over all its records. Every single-record write to a cash record is
//! checked against it before it reaches storage:
//!
//! 1. amounts are never negative;
//! 2. neither the old nor the new business day may be closed;
//! 3. a write that lowers the balance must leave it at zero or above.
//!
//! Bulk writes to cash records and day closes are refused outright so the
//! balance check always sees one record at a time.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tally_core::{BusinessDate, EntityKind, Filter, Payload, Record, RecordExt, TenantId};
use tally_store::Store;

use crate::error::{GuardError, GuardResult};
use crate::guard::{BulkRequest, Operation, WriteGuard, WriteRequest};

const DATE_FIELD: &str = "business_date";
const AMOUNT_FIELD: &str = "amount";

/// +1 for inflows, −1 for outflows.
fn direction(entity: EntityKind) -> Option<Decimal> {
    match entity {
        EntityKind::CashIn => Some(Decimal::ONE),
        EntityKind::CashOut => Some(Decimal::NEGATIVE_ONE),
        _ => None,
    }
}

fn amount_of(entity: EntityKind, row: &Record) -> GuardResult<Decimal> {
    if !row.is_set(AMOUNT_FIELD) {
        return Ok(Decimal::ZERO);
    }
    let amount = row
        .decimal_field(AMOUNT_FIELD)
        .ok_or_else(|| GuardError::invalid(entity, AMOUNT_FIELD, "not a decimal amount"))?;
    if amount < Decimal::ZERO {
        return Err(GuardError::CashAmountNegative { entity, amount });
    }
    Ok(amount)
}

/// The tenant's current running balance.
pub async fn running_balance(store: &dyn Store, tenant: &TenantId) -> GuardResult<Decimal> {
    let filter = Filter::new().eq("tenant_id", tenant.to_value());
    let inflow = store.aggregate_sum(EntityKind::CashIn, &filter, AMOUNT_FIELD).await?;
    let outflow = store.aggregate_sum(EntityKind::CashOut, &filter, AMOUNT_FIELD).await?;
    Ok(inflow - outflow)
}

/// Whether the tenant has closed `date`. Close rows are compared by their
/// parsed business date, so an instant-form `business_date` closes its UTC day.
pub async fn is_day_closed(store: &dyn Store, tenant: &TenantId, date: BusinessDate) -> GuardResult<bool> {
    let filter = Filter::new().eq("tenant_id", tenant.to_value());
    let closes = store.find_many(EntityKind::CashDayClose, &filter).await?;
    Ok(closes.iter().any(|c| c.date_field(DATE_FIELD) == Some(date)))
}

fn resolve_tenant(req: &WriteRequest<'_>) -> Option<TenantId> {
    req.tenant
        .cloned()
        .or_else(|| req.payload.and_then(|p| p.set_value("tenant_id")).and_then(TenantId::from_value))
        .or_else(|| req.current.and_then(RecordExt::tenant_id))
}

/// The new and old business days of a write. Null or unparseable dates
/// resolve nothing.
fn affected_dates(req: &WriteRequest<'_>) -> Vec<BusinessDate> {
    let mut dates = Vec::with_capacity(2);
    if let Some(date) = req
        .payload
        .and_then(|p: &Payload| p.set_value(DATE_FIELD))
        .and_then(BusinessDate::from_value)
    {
        dates.push(date);
    }
    if let Some(date) = req.current.and_then(|c| c.date_field(DATE_FIELD)) {
        if !dates.contains(&date) {
            dates.push(date);
        }
    }
    dates
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CashGuard;

#[async_trait]
impl WriteGuard for CashGuard {
    fn name(&self) -> &'static str {
        "cash"
    }

    async fn check(&self, store: &dyn Store, req: &WriteRequest<'_>) -> GuardResult<()> {
        let Some(sign) = direction(req.entity) else {
            return Ok(());
        };

        let before = match req.current {
            Some(current) => amount_of(req.entity, current)?,
            None => Decimal::ZERO,
        };
        let after = match req.operation {
            Operation::Delete => Decimal::ZERO,
            Operation::Create | Operation::Update => amount_of(req.entity, &req.merged())?,
        };

        let Some(tenant) = resolve_tenant(req) else {
            tracing::debug!(entity = %req.entity, "no tenant resolved; cash checks skipped");
            return Ok(());
        };

        for date in affected_dates(req) {
            if is_day_closed(store, &tenant, date).await? {
                return Err(GuardError::CashDayClosed { business_date: date });
            }
        }

        let delta = sign * (after - before);
        if delta >= Decimal::ZERO {
            return Ok(());
        }
        let balance = running_balance(store, &tenant).await?;
        let projected = balance + delta;
        if projected < Decimal::ZERO {
            return Err(GuardError::CashBalanceWouldGoNegative { balance, projected });
        }
        Ok(())
    }

    async fn check_bulk(&self, _store: &dyn Store, req: &BulkRequest<'_>) -> GuardResult<()> {
        match req.entity {
            EntityKind::CashIn | EntityKind::CashOut | EntityKind::CashDayClose => {
                Err(GuardError::BulkCashMutationNotAllowed { entity: req.entity })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use tally_store::MemoryStore;

    fn row(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn tenant() -> TenantId {
        TenantId::new("t-1")
    }

    fn create<'a>(entity: EntityKind, payload: &'a Payload, tenant: &'a TenantId) -> WriteRequest<'a> {
        WriteRequest {
            entity,
            operation: Operation::Create,
            payload: Some(payload),
            filter: None,
            current: None,
            tenant: Some(tenant),
            regulatory: None,
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(
            EntityKind::CashIn,
            [row(json!({"id": "ci-1", "tenant_id": "t-1", "amount": "60.00", "business_date": "2026-03-01"}))],
        );
        store
    }

    #[tokio::test]
    async fn outflow_beyond_balance_is_refused() {
        let store = seeded();
        let t = tenant();
        let p = Payload::new().set("amount", "100.00").set("business_date", "2026-03-02");
        match CashGuard.check(&store, &create(EntityKind::CashOut, &p, &t)).await.unwrap_err() {
            GuardError::CashBalanceWouldGoNegative { balance, projected } => {
                assert_eq!(balance, dec!(60.00));
                assert_eq!(projected, dec!(-40.00));
            }
            other => panic!("unexpected {other:?}"),
        }
        let p = Payload::new().set("amount", "60.00").set("business_date", "2026-03-02");
        assert!(CashGuard.check(&store, &create(EntityKind::CashOut, &p, &t)).await.is_ok());
    }

    #[tokio::test]
    async fn other_tenants_cash_does_not_count() {
        let store = seeded();
        let other = TenantId::new("t-2");
        let p = Payload::new().set("amount", "1").set("business_date", "2026-03-02");
        assert!(CashGuard.check(&store, &create(EntityKind::CashOut, &p, &other)).await.is_err());
    }

    #[tokio::test]
    async fn deleting_an_inflow_counts_against_balance() {
        let store = seeded();
        store.seed(
            EntityKind::CashOut,
            [row(json!({"id": "co-1", "tenant_id": "t-1", "amount": "50", "business_date": "2026-03-01"}))],
        );
        let current = row(json!({"id": "ci-1", "tenant_id": "t-1", "amount": "60.00", "business_date": "2026-03-01"}));
        let t = tenant();
        let req = WriteRequest {
            entity: EntityKind::CashIn,
            operation: Operation::Delete,
            payload: None,
            filter: None,
            current: Some(&current),
            tenant: Some(&t),
            regulatory: None,
        };
        assert!(CashGuard.check(&store, &req).await.is_err());
    }

    #[tokio::test]
    async fn closed_day_is_frozen() {
        let store = seeded();
        store.seed(
            EntityKind::CashDayClose,
            [row(json!({"id": "cd-1", "tenant_id": "t-1", "business_date": "2026-03-01"}))],
        );
        let t = tenant();
        let p = Payload::new().set("amount", "5").set("business_date", "2026-03-01");
        let err = CashGuard.check(&store, &create(EntityKind::CashIn, &p, &t)).await.unwrap_err();
        assert_eq!(err.code(), "CASH_DAY_CLOSED");

        // Moving a record off a closed day is refused too.
        let current = row(json!({"id": "ci-1", "tenant_id": "t-1", "amount": "60.00", "business_date": "2026-03-01"}));
        let moving = Payload::new().set("business_date", "2026-03-05");
        let req = WriteRequest {
            operation: Operation::Update,
            payload: Some(&moving),
            current: Some(&current),
            ..create(EntityKind::CashIn, &p, &t)
        };
        assert!(CashGuard.check(&store, &req).await.is_err());
    }

    #[tokio::test]
    async fn instant_form_close_freezes_its_day() {
        let store = seeded();
        store.seed(
            EntityKind::CashDayClose,
            [row(json!({"id": "cd-2", "tenant_id": "t-1", "business_date": "2026-05-04T00:00:00Z"}))],
        );
        let t = tenant();
        let p = Payload::new().set("amount", "5").set("business_date", "2026-05-04");
        let err = CashGuard.check(&store, &create(EntityKind::CashIn, &p, &t)).await.unwrap_err();
        match err {
            GuardError::CashDayClosed { business_date } => assert_eq!(business_date.to_string(), "2026-05-04"),
            other => panic!("unexpected {other:?}"),
        }
        let p = Payload::new().set("amount", "5").set("business_date", "2026-05-05");
        assert!(CashGuard.check(&store, &create(EntityKind::CashIn, &p, &t)).await.is_ok());
    }

    #[tokio::test]
    async fn unparseable_date_skips_the_day_check() {
        let store = seeded();
        let t = tenant();
        let p = Payload::new().set("amount", "5").set("business_date", "someday");
        assert!(CashGuard.check(&store, &create(EntityKind::CashIn, &p, &t)).await.is_ok());
    }

    #[tokio::test]
    async fn negative_amount_is_refused() {
        let store = MemoryStore::new();
        let t = tenant();
        let p = Payload::new().set("amount", "-1").set("business_date", "2026-03-02");
        let err = CashGuard.check(&store, &create(EntityKind::CashIn, &p, &t)).await.unwrap_err();
        assert_eq!(err.code(), "CASH_AMOUNT_NEGATIVE");
    }

    #[tokio::test]
    async fn bulk_is_refused() {
        let store = MemoryStore::new();
        let req = BulkRequest {
            entity: EntityKind::CashDayClose,
            operation: crate::guard::BulkOperation::CreateMany,
            payloads: &[],
            payload: None,
            filter: None,
            tenant: None,
            regulatory: None,
        };
        assert_eq!(
            CashGuard.check_bulk(&store, &req).await.unwrap_err().code(),
            "BULK_CASH_MUTATION_NOT_ALLOWED"
        );
    }
}
