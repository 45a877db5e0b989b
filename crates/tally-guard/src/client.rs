//! # Guarded Store
//!
//! [`GuardedStore`] wraps any [`Store`] and exposes the same operations with
//! the guard layer in front of them. For each call it:
//!
//! 1. reads the request context (tenant, audit actor, regulatory context);
//! 2. rewrites filters and payloads for tenant isolation;
//! 3. for single-record update, delete and upsert, fetches the current row
//!    under the scoped filter (a missing row is `NotFound`);
//! 4. runs the guard chain and aborts on the first rejection;
//! 5. performs the write against the underlying store;
//! 6. enqueues the audit record and derived operational events.
//!
//! Steps 3 to 5 are check-then-act: nothing locks the row or the balance
//! between the guard reads and the write, so concurrent writers can race.
//! Bulk writes are guarded but not audited.

use rust_decimal::Decimal;
use serde_json::Value;
use tally_core::{EntityKind, Filter, Payload, Record, RecordExt, TenantId, Timestamp};
use tally_store::{SharedStore, Store};

use crate::audit::{Attribution, AuditAction, AuditChanges, AuditRecord};
use crate::cash::CashGuard;
use crate::config::GuardConfig;
use crate::context::{self, RequestContext};
use crate::error::{GuardError, GuardResult};
use crate::events;
use crate::guard::{BulkOperation, BulkRequest, Operation, WriteGuard, WriteRequest};
use crate::immutability::ImmutabilityGuard;
use crate::ledger::LedgerGuard;
use crate::metrics;
use crate::period::PeriodLockGuard;
use crate::queue::{SideEffect, SideEffectQueue};
use crate::tenant;
use crate::transitions::StatusTransitionGuard;

/// The standard guard chain, in evaluation order.
pub fn default_guards() -> Vec<Box<dyn WriteGuard>> {
    vec![
        Box::new(PeriodLockGuard),
        Box::new(ImmutabilityGuard),
        Box::new(StatusTransitionGuard),
        Box::new(LedgerGuard),
        Box::new(CashGuard),
    ]
}

pub struct GuardedStore {
    store: SharedStore,
    guards: Vec<Box<dyn WriteGuard>>,
    side_effects: SideEffectQueue,
    config: GuardConfig,
}

impl std::fmt::Debug for GuardedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedStore")
            .field("guards", &self.guards.iter().map(|g| g.name()).collect::<Vec<_>>())
            .field("side_effects", &self.side_effects)
            .field("config", &self.config)
            .finish()
    }
}

impl GuardedStore {
    /// Wrap `store` with the standard guard chain. Spawns the side-effect
    /// worker, so this must be called inside a Tokio runtime.
    pub fn new(store: SharedStore, config: GuardConfig) -> Self {
        Self::with_guards(store, config, default_guards())
    }

    pub fn with_guards(store: SharedStore, config: GuardConfig, guards: Vec<Box<dyn WriteGuard>>) -> Self {
        let side_effects = SideEffectQueue::start(store.clone(), config.queue_capacity);
        Self {
            store,
            guards,
            side_effects,
            config,
        }
    }

    /// The unguarded store underneath.
    pub fn raw(&self) -> &SharedStore {
        &self.store
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Wait for queued audit records and events to be persisted.
    pub async fn flush(&self) {
        self.side_effects.flush().await;
    }

    /// Drain the side-effect queue and stop its worker.
    pub async fn shutdown(&self) {
        self.side_effects.shutdown().await;
    }

    // ─── Reads ──────────────────────────────────────────────────────────

    /// Fetch one row. A row owned by another tenant reads as `None`.
    pub async fn find_unique(&self, entity: EntityKind, filter: &Filter) -> GuardResult<Option<Record>> {
        let ctx = request_context();
        let row = self.store.find_unique(entity, filter).await?;
        Ok(row.filter(|r| tenant::is_visible(entity, r, ctx.tenant_id())))
    }

    pub async fn find_first(&self, entity: EntityKind, filter: &Filter) -> GuardResult<Option<Record>> {
        let scoped = self.scoped(entity, filter);
        Ok(self.store.find_first(entity, &scoped).await?)
    }

    pub async fn find_many(&self, entity: EntityKind, filter: &Filter) -> GuardResult<Vec<Record>> {
        let scoped = self.scoped(entity, filter);
        Ok(self.store.find_many(entity, &scoped).await?)
    }

    pub async fn count(&self, entity: EntityKind, filter: &Filter) -> GuardResult<u64> {
        let scoped = self.scoped(entity, filter);
        Ok(self.store.count(entity, &scoped).await?)
    }

    pub async fn aggregate_sum(&self, entity: EntityKind, filter: &Filter, field: &str) -> GuardResult<Decimal> {
        let scoped = self.scoped(entity, filter);
        Ok(self.store.aggregate_sum(entity, &scoped, field).await?)
    }

    pub async fn group_by_sum(
        &self,
        entity: EntityKind,
        filter: &Filter,
        group_field: &str,
        sum_field: &str,
    ) -> GuardResult<Vec<(Value, Decimal)>> {
        let scoped = self.scoped(entity, filter);
        Ok(self
            .store
            .group_by_sum(entity, &scoped, group_field, sum_field)
            .await?)
    }

    // ─── Single-record writes ───────────────────────────────────────────

    pub async fn create(&self, entity: EntityKind, data: &Payload) -> GuardResult<Record> {
        let ctx = request_context();
        self.create_in(&ctx, entity, data).await
    }

    pub async fn update(&self, entity: EntityKind, filter: &Filter, data: &Payload) -> GuardResult<Record> {
        let ctx = request_context();
        let scoped = tenant::scope_filter(entity, filter, ctx.tenant_id());
        let current = self
            .store
            .find_first(entity, &scoped)
            .await?
            .ok_or(GuardError::NotFound { entity })?;
        self.update_in(&ctx, entity, &scoped, current, data).await
    }

    pub async fn delete(&self, entity: EntityKind, filter: &Filter) -> GuardResult<Record> {
        let ctx = request_context();
        let scoped = tenant::scope_filter(entity, filter, ctx.tenant_id());
        let current = self
            .store
            .find_first(entity, &scoped)
            .await?
            .ok_or(GuardError::NotFound { entity })?;
        let req = WriteRequest {
            entity,
            operation: Operation::Delete,
            payload: None,
            filter: Some(&scoped),
            current: Some(&current),
            tenant: ctx.tenant_id(),
            regulatory: ctx.regulatory.as_ref(),
        };
        self.run_guards(&req).await?;
        let target = target_filter(entity, &current, &scoped, ctx.tenant_id());
        let deleted = self.store.delete(entity, &target).await?;
        self.after_write(&ctx, entity, Operation::Delete, Some(&current), None);
        Ok(deleted)
    }

    /// Update the row matching `filter`, or create one from `create`.
    /// Guarded as an update when the row exists and as a create otherwise.
    pub async fn upsert(
        &self,
        entity: EntityKind,
        filter: &Filter,
        create: &Payload,
        update: &Payload,
    ) -> GuardResult<Record> {
        let ctx = request_context();
        let scoped = tenant::scope_filter(entity, filter, ctx.tenant_id());
        match self.store.find_first(entity, &scoped).await? {
            Some(current) => self.update_in(&ctx, entity, &scoped, current, update).await,
            None => self.create_in(&ctx, entity, create).await,
        }
    }

    // ─── Bulk writes ────────────────────────────────────────────────────

    pub async fn create_many(&self, entity: EntityKind, data: &[Payload]) -> GuardResult<u64> {
        let ctx = request_context();
        let scoped: Vec<Payload> = data
            .iter()
            .map(|p| tenant::scope_create(entity, p, ctx.tenant_id()))
            .collect();
        let req = BulkRequest {
            entity,
            operation: BulkOperation::CreateMany,
            payloads: &scoped,
            payload: None,
            filter: None,
            tenant: ctx.tenant_id(),
            regulatory: ctx.regulatory.as_ref(),
        };
        self.run_bulk_guards(&req).await?;
        Ok(self.store.create_many(entity, &scoped).await?)
    }

    pub async fn update_many(&self, entity: EntityKind, filter: &Filter, data: &Payload) -> GuardResult<u64> {
        let ctx = request_context();
        let scoped = tenant::scope_filter(entity, filter, ctx.tenant_id());
        let payload = tenant::scope_update(entity, data, ctx.tenant_id());
        let req = BulkRequest {
            entity,
            operation: BulkOperation::UpdateMany,
            payloads: &[],
            payload: Some(&payload),
            filter: Some(&scoped),
            tenant: ctx.tenant_id(),
            regulatory: ctx.regulatory.as_ref(),
        };
        self.run_bulk_guards(&req).await?;
        Ok(self.store.update_many(entity, &scoped, &payload).await?)
    }

    pub async fn delete_many(&self, entity: EntityKind, filter: &Filter) -> GuardResult<u64> {
        let ctx = request_context();
        let scoped = tenant::scope_filter(entity, filter, ctx.tenant_id());
        let req = BulkRequest {
            entity,
            operation: BulkOperation::DeleteMany,
            payloads: &[],
            payload: None,
            filter: Some(&scoped),
            tenant: ctx.tenant_id(),
            regulatory: ctx.regulatory.as_ref(),
        };
        self.run_bulk_guards(&req).await?;
        Ok(self.store.delete_many(entity, &scoped).await?)
    }

    // ─── Internals ──────────────────────────────────────────────────────

    fn scoped(&self, entity: EntityKind, filter: &Filter) -> Filter {
        tenant::scope_filter(entity, filter, context::tenant_id().as_ref())
    }

    async fn create_in(&self, ctx: &RequestContext, entity: EntityKind, data: &Payload) -> GuardResult<Record> {
        let payload = tenant::scope_create(entity, data, ctx.tenant_id());
        let req = WriteRequest {
            entity,
            operation: Operation::Create,
            payload: Some(&payload),
            filter: None,
            current: None,
            tenant: ctx.tenant_id(),
            regulatory: ctx.regulatory.as_ref(),
        };
        self.run_guards(&req).await?;
        let created = self.store.create(entity, &payload).await?;
        self.after_write(ctx, entity, Operation::Create, None, Some(&created));
        Ok(created)
    }

    async fn update_in(
        &self,
        ctx: &RequestContext,
        entity: EntityKind,
        scoped: &Filter,
        current: Record,
        data: &Payload,
    ) -> GuardResult<Record> {
        let payload = tenant::scope_update(entity, data, ctx.tenant_id());
        let req = WriteRequest {
            entity,
            operation: Operation::Update,
            payload: Some(&payload),
            filter: Some(scoped),
            current: Some(&current),
            tenant: ctx.tenant_id(),
            regulatory: ctx.regulatory.as_ref(),
        };
        self.run_guards(&req).await?;
        let target = target_filter(entity, &current, scoped, ctx.tenant_id());
        let updated = self.store.update(entity, &target, &payload).await?;
        self.after_write(ctx, entity, Operation::Update, Some(&current), Some(&updated));
        Ok(updated)
    }

    async fn run_guards(&self, req: &WriteRequest<'_>) -> GuardResult<()> {
        for guard in &self.guards {
            if let Err(err) = guard.check(self.store.as_ref(), req).await {
                log_refusal(guard.name(), req.entity, req.operation.as_str(), &err);
                return Err(err);
            }
        }
        Ok(())
    }

    async fn run_bulk_guards(&self, req: &BulkRequest<'_>) -> GuardResult<()> {
        for guard in &self.guards {
            if let Err(err) = guard.check_bulk(self.store.as_ref(), req).await {
                log_refusal(guard.name(), req.entity, req.operation.as_str(), &err);
                return Err(err);
            }
        }
        Ok(())
    }

    fn after_write(
        &self,
        ctx: &RequestContext,
        entity: EntityKind,
        operation: Operation,
        before: Option<&Record>,
        after: Option<&Record>,
    ) {
        if self.config.audit_enabled && entity.is_audited() {
            let actor = ctx
                .audit
                .as_ref()
                .map(|a| a.actor.clone())
                .or_else(|| ctx.user_id().map(|u| u.as_str().to_string()))
                .unwrap_or_else(|| self.config.default_actor.clone());
            let by = Attribution {
                actor,
                user_id: ctx.user_id().cloned(),
                reason: ctx.audit.as_ref().and_then(|a| a.reason.clone()),
            };
            let changes = AuditChanges {
                before: before.cloned(),
                after: after.cloned(),
            };
            match AuditRecord::new(by, AuditAction::from(operation), entity, changes) {
                Ok(record) => {
                    self.side_effects.enqueue(SideEffect::Audit(record));
                }
                Err(e) => {
                    tracing::error!(entity = %entity, error = %e, "failed to build audit record");
                    metrics::record_persist_failure("audit");
                }
            }
        }
        if self.config.events_enabled {
            for event in events::derive(entity, before, after, Timestamp::now()) {
                tracing::debug!(
                    event_type = %event.event_type,
                    source_id = %event.source_id,
                    "operational event derived"
                );
                self.side_effects.enqueue(SideEffect::Event(event));
            }
        }
    }
}

fn request_context() -> RequestContext {
    context::current().unwrap_or_default()
}

/// Address the fetched row by id, still under the tenant scope.
fn target_filter(entity: EntityKind, current: &Record, scoped: &Filter, tenant: Option<&TenantId>) -> Filter {
    match current.record_id() {
        Some(id) => tenant::scope_filter(entity, &Filter::by_id(id.as_str()), tenant),
        None => scoped.clone(),
    }
}

fn log_refusal(guard: &'static str, entity: EntityKind, operation: &str, err: &GuardError) {
    if err.is_rejection() {
        tracing::debug!(guard, entity = %entity, operation, code = err.code(), error = %err, "write refused");
        metrics::record_rejection(entity, err);
    } else {
        tracing::warn!(guard, entity = %entity, operation, error = %err, "guard could not complete");
    }
}
