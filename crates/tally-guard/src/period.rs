//! # Period Lock Guard
//!
//! Refuses writes whose effective date falls inside a `CLOSED` or `LOCKED`
//! accounting period of the same tenant.
//!
//! Resolution order for the tenant: request context, payload, filter,
//! existing row. For the effective date: the payload's date column, else the
//! existing row's (direct entities), or the parent row's date reached
//! through the payload's or existing row's foreign key (derived entities).
//! Updates of direct entities check both the old and the new date, so a row
//! cannot be moved out of a locked period either. A null or unparseable
//! payload date resolves nothing. If the tenant or every date is unresolved
//! the write passes.
//!
//! Period bounds and effective dates are compared as [`BusinessDate`]s, so
//! a bound stored as an RFC 3339 instant covers its whole UTC day.
//!
//! Bulk updates and deletes are checked for direct entities only: the guard
//! collects the tenant's locked periods and refuses the write if any row
//! matching the caller's filter is dated inside one of them.

use async_trait::async_trait;
use serde_json::Value;
use tally_core::{BusinessDate, EntityKind, Filter, Payload, Record, RecordExt, TenantId};
use tally_state::PeriodStatus;
use tally_store::Store;

use crate::error::{GuardError, GuardResult};
use crate::guard::{BulkOperation, BulkRequest, Operation, WriteGuard, WriteRequest};
use crate::registry::{registration, DateSource, EntityRegistration};

#[derive(Debug, Default, Clone, Copy)]
pub struct PeriodLockGuard;

fn blocking_statuses() -> Vec<Value> {
    PeriodStatus::blocking().iter().map(|s| Value::from(*s)).collect()
}

/// Resolve the tenant a write belongs to.
fn resolve_tenant(
    tenant: Option<&TenantId>,
    payload: Option<&Payload>,
    filter: Option<&Filter>,
    current: Option<&Record>,
) -> Option<TenantId> {
    tenant
        .cloned()
        .or_else(|| payload.and_then(|p| p.set_value("tenant_id")).and_then(TenantId::from_value))
        .or_else(|| filter.and_then(|f| f.eq_value("tenant_id")).and_then(TenantId::from_value))
        .or_else(|| current.and_then(RecordExt::tenant_id))
}

/// The tenant's `CLOSED` and `LOCKED` periods.
async fn locked_periods(store: &dyn Store, tenant: &TenantId) -> GuardResult<Vec<Record>> {
    let filter = Filter::new()
        .eq("tenant_id", tenant.to_value())
        .in_values("status", blocking_statuses());
    Ok(store.find_many(EntityKind::AccountingPeriod, &filter).await?)
}

/// The locked period containing `date`, if any.
pub async fn locked_period_for(
    store: &dyn Store,
    tenant: &TenantId,
    date: BusinessDate,
) -> GuardResult<Option<Record>> {
    Ok(locked_periods(store, tenant)
        .await?
        .into_iter()
        .find(|p| contains(p, date)))
}

impl PeriodLockGuard {
    async fn effective_dates(
        &self,
        store: &dyn Store,
        reg: &EntityRegistration,
        req: &WriteRequest<'_>,
        tenant: &TenantId,
    ) -> GuardResult<Vec<BusinessDate>> {
        let mut dates = Vec::new();
        match reg.date_source {
            DateSource::Direct { field } => {
                let new_date = req
                    .payload
                    .and_then(|p| p.set_value(field))
                    .and_then(BusinessDate::from_value);
                if let Some(d) = new_date {
                    dates.push(d);
                }
                if req.operation != Operation::Create {
                    if let Some(d) = req.current.and_then(|c| c.date_field(field)) {
                        dates.push(d);
                    }
                }
            }
            DateSource::Derived {
                foreign_key,
                parent,
                parent_field,
            } => {
                let mut parent_ids: Vec<Value> = Vec::new();
                if let Some(v) = req.payload.and_then(|p| p.set_value(foreign_key)) {
                    parent_ids.push(v.clone());
                }
                if req.operation != Operation::Create {
                    if let Some(v) = req.current.and_then(|c| c.get(foreign_key)) {
                        if !v.is_null() && !parent_ids.contains(v) {
                            parent_ids.push(v.clone());
                        }
                    }
                }
                for id in parent_ids {
                    let filter = Filter::by_id(id).eq("tenant_id", tenant.to_value());
                    if let Some(row) = store.find_unique(parent, &filter).await? {
                        if let Some(d) = row.date_field(parent_field) {
                            dates.push(d);
                        }
                    }
                }
            }
        }
        dates.dedup();
        Ok(dates)
    }

    async fn check_bulk_direct(
        &self,
        store: &dyn Store,
        reg: &EntityRegistration,
        field: &'static str,
        req: &BulkRequest<'_>,
    ) -> GuardResult<()> {
        let Some(tenant) = resolve_tenant(req.tenant, req.payload, req.filter, None) else {
            return Ok(());
        };

        let periods = locked_periods(store, &tenant).await?;

        // An update_many that moves rows onto a locked date.
        let new_date = req
            .payload
            .and_then(|p| p.set_value(field))
            .and_then(BusinessDate::from_value);
        if let Some(date) = new_date {
            if let Some(period) = periods.iter().find(|p| contains(p, date)) {
                return Err(period_locked(reg.entity, date, period));
            }
        }

        let mut ranges = Vec::with_capacity(periods.len());
        for period in &periods {
            let (Some(start), Some(end)) = (period.date_field("start_date"), period.date_field("end_date")) else {
                continue;
            };
            let mut range = Filter::new().gte(field, start.to_value());
            range = match end.next_day() {
                Some(after) => range.lt(field, after.to_value()),
                None => range.lte(field, end.to_value()),
            };
            ranges.push(range);
        }
        if ranges.is_empty() {
            return Ok(());
        }

        let probe = req
            .filter_or_all()
            .without_field("tenant_id")
            .eq("tenant_id", tenant.to_value())
            .any(ranges);
        let Some(row) = store.find_first(reg.entity, &probe).await? else {
            return Ok(());
        };
        let date = row
            .date_field(field)
            .ok_or_else(|| GuardError::invalid(reg.entity, field, "unparseable date on stored row"))?;
        let status = periods
            .iter()
            .find(|p| contains(p, date))
            .and_then(|p| p.str_field("status"))
            .unwrap_or("CLOSED")
            .to_string();
        Err(GuardError::PeriodLocked {
            entity: reg.entity,
            effective_date: date,
            period_status: status,
        })
    }
}

fn contains(period: &Record, date: BusinessDate) -> bool {
    match (period.date_field("start_date"), period.date_field("end_date")) {
        (Some(start), Some(end)) => start <= date && date <= end,
        _ => false,
    }
}

fn period_locked(entity: EntityKind, date: BusinessDate, period: &Record) -> GuardError {
    GuardError::PeriodLocked {
        entity,
        effective_date: date,
        period_status: period.str_field("status").unwrap_or("CLOSED").to_string(),
    }
}

#[async_trait]
impl WriteGuard for PeriodLockGuard {
    fn name(&self) -> &'static str {
        "period_lock"
    }

    async fn check(&self, store: &dyn Store, req: &WriteRequest<'_>) -> GuardResult<()> {
        let Some(reg) = registration(req.entity) else {
            return Ok(());
        };
        if !reg.checks(req.operation) {
            return Ok(());
        }
        let Some(tenant) = resolve_tenant(req.tenant, req.payload, req.filter, req.current) else {
            tracing::debug!(entity = %req.entity, "period check skipped: tenant unresolved");
            return Ok(());
        };
        let dates = self.effective_dates(store, reg, req, &tenant).await?;
        if dates.is_empty() {
            tracing::debug!(entity = %req.entity, "period check skipped: effective date unresolved");
            return Ok(());
        }
        for date in dates {
            if let Some(period) = locked_period_for(store, &tenant, date).await? {
                return Err(period_locked(req.entity, date, &period));
            }
        }
        Ok(())
    }

    async fn check_bulk(&self, store: &dyn Store, req: &BulkRequest<'_>) -> GuardResult<()> {
        let Some(reg) = registration(req.entity) else {
            return Ok(());
        };
        if !reg.checks(req.operation.element_operation()) {
            return Ok(());
        }
        // Derived entities rely on their parent's enforcement.
        let DateSource::Direct { field } = reg.date_source else {
            return Ok(());
        };
        match req.operation {
            BulkOperation::CreateMany => {
                for payload in req.payloads {
                    self.check(store, &req.element(payload)).await?;
                }
                Ok(())
            }
            BulkOperation::UpdateMany | BulkOperation::DeleteMany => {
                self.check_bulk_direct(store, reg, field, req).await
            }
        }
    }
}
