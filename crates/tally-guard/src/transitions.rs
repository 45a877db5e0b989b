//! # Status Transition Guard
//!
//! Applies the workflow tables from `tally-state` to writes:
//!
//! - creates must start in an initial status (or reach an auto-approve
//!   target with a source);
//! - single-record updates that touch the status column must follow an
//!   edge, an escape hatch, or a downgrade bypass;
//! - a transition may only write the columns registered for that edge;
//! - once a payout leaves DRAFT the payout and its lines are frozen apart
//!   from further transitions;
//! - bulk writes may never change a workflow status.

use async_trait::async_trait;
use serde_json::Value;
use tally_core::{EntityKind, Filter, Payload, Record, RecordExt, TenantId};
use tally_state::{RegulatoryTransitionContext, TransitionError, TransitionPath, Workflow};
use tally_store::Store;

use crate::error::{GuardError, GuardResult};
use crate::guard::{BulkOperation, BulkRequest, Operation, WriteGuard, WriteRequest};

fn illegal(workflow: Workflow, from: Option<&str>, to: &str, err: TransitionError) -> GuardError {
    let allowed_targets = match (err.allowed_targets(), from) {
        ([], Some(from)) => workflow.allowed_targets(from),
        (allowed, _) => allowed.to_vec(),
    };
    GuardError::IllegalStatusTransition {
        entity: workflow.entity(),
        from: from.map(str::to_string),
        to: to.to_string(),
        allowed_targets,
        reason: err.to_string(),
    }
}

/// The status a payload assigns, if any.
fn requested_status<'p>(workflow: Workflow, payload: Option<&'p Payload>) -> GuardResult<Option<&'p str>> {
    let field = workflow.status_field();
    match payload.and_then(|p| p.set_value(field)) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(GuardError::invalid(
            workflow.entity(),
            field,
            format!("expected a status string, got {other}"),
        )),
    }
}

/// The workflow whose lock also freezes `entity`, with the foreign key.
fn parent_workflow(entity: EntityKind) -> Option<(Workflow, &'static str)> {
    Workflow::all().iter().find_map(|w| match w.child() {
        Some((child, fk)) if child == entity && w.locks_after_initial() => Some((*w, fk)),
        _ => None,
    })
}

fn frozen(entity: EntityKind, fields: Vec<String>, state: String) -> GuardError {
    GuardError::ImmutabilityViolation {
        entity,
        fields,
        current_status: Some(state),
    }
}

/// Check the status a record is being created with.
pub fn check_create_status(
    workflow: Workflow,
    status: &str,
    ctx: Option<&RegulatoryTransitionContext>,
) -> GuardResult<()> {
    let Err(err) = workflow.check_initial(status) else {
        return Ok(());
    };
    match workflow.check(workflow.default_initial(), status, ctx) {
        Ok(TransitionPath::AutoApprove) => Ok(()),
        _ => Err(illegal(workflow, None, status, err)),
    }
}

/// Check a single-record status change and the columns written with it.
pub fn check_status_change(
    workflow: Workflow,
    current: &Record,
    payload: &Payload,
    to: &str,
    ctx: Option<&RegulatoryTransitionContext>,
) -> GuardResult<TransitionPath> {
    let from = current
        .str_field(workflow.status_field())
        .unwrap_or_else(|| workflow.default_initial());
    let path = workflow
        .check(from, to, ctx)
        .map_err(|err| illegal(workflow, Some(from), to, err))?;
    match path {
        TransitionPath::LegacyBypass => {
            tracing::warn!(
                entity = %workflow.entity(),
                record_id = ?current.record_id(),
                from,
                to,
                "status change admitted by legacy bypass"
            );
        }
        TransitionPath::EscapeHatch(action) => {
            tracing::info!(entity = %workflow.entity(), ?action, from, to, "status change via escape hatch");
        }
        _ => {}
    }
    if let Some(fields) = workflow.edge_fields(from, to) {
        let extra: Vec<String> = payload
            .keys()
            .filter(|k| !fields.contains(k))
            .map(str::to_string)
            .collect();
        if !extra.is_empty() {
            return Err(frozen(workflow.entity(), extra, from.to_string()));
        }
    }
    Ok(path)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StatusTransitionGuard;

impl StatusTransitionGuard {
    fn check_workflow(&self, workflow: Workflow, req: &WriteRequest<'_>) -> GuardResult<()> {
        match req.operation {
            Operation::Create => match requested_status(workflow, req.payload)? {
                Some(status) => check_create_status(workflow, status, req.regulatory),
                None => Ok(()),
            },
            Operation::Update => {
                let (Some(current), Some(payload)) = (req.current, req.payload) else {
                    return Ok(());
                };
                let from = current
                    .str_field(workflow.status_field())
                    .unwrap_or_else(|| workflow.default_initial());
                let requested = requested_status(workflow, Some(payload))?;
                let path = match requested {
                    Some(to) => check_status_change(workflow, current, payload, to, req.regulatory)?,
                    None => TransitionPath::Unchanged,
                };
                // Re-asserting the current status alone writes nothing new.
                let status_only =
                    requested.is_some() && payload.keys().all(|k| k == workflow.status_field());
                if path == TransitionPath::Unchanged
                    && !status_only
                    && workflow.locks_after_initial()
                    && !workflow.is_initial(from)
                {
                    return Err(frozen(workflow.entity(), req.keys(), from.to_string()));
                }
                Ok(())
            }
            Operation::Delete => match req.current.and_then(|c| c.str_field(workflow.status_field())) {
                Some(from) if workflow.locks_after_initial() && !workflow.is_initial(from) => {
                    Err(frozen(workflow.entity(), Vec::new(), from.to_string()))
                }
                _ => Ok(()),
            },
        }
    }

    /// Refuse writes to a child row whose parent has left its initial state.
    async fn check_parent(
        &self,
        store: &dyn Store,
        entity: EntityKind,
        workflow: Workflow,
        parent_ids: &[&Value],
        fields: Vec<String>,
        tenant: Option<&TenantId>,
    ) -> GuardResult<()> {
        for id in parent_ids.iter().filter(|v| !v.is_null()) {
            let mut filter = Filter::by_id((*id).clone());
            if let Some(t) = tenant {
                filter = filter.eq("tenant_id", t.to_value());
            }
            let Some(parent) = store.find_unique(workflow.entity(), &filter).await? else {
                continue;
            };
            if let Some(status) = parent.str_field(workflow.status_field()) {
                if !workflow.is_initial(status) {
                    return Err(frozen(entity, fields, format!("{} {status}", workflow.entity())));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WriteGuard for StatusTransitionGuard {
    fn name(&self) -> &'static str {
        "status_transition"
    }

    async fn check(&self, store: &dyn Store, req: &WriteRequest<'_>) -> GuardResult<()> {
        if let Some(workflow) = Workflow::for_entity(req.entity) {
            return self.check_workflow(workflow, req);
        }
        let Some((workflow, fk)) = parent_workflow(req.entity) else {
            return Ok(());
        };
        let mut ids: Vec<&Value> = Vec::new();
        if let Some(id) = req.payload.and_then(|p| p.set_value(fk)) {
            ids.push(id);
        }
        if let Some(id) = req.current.and_then(|c| c.get(fk)) {
            ids.push(id);
        }
        let tenant = req.tenant.cloned().or_else(|| req.current.and_then(RecordExt::tenant_id));
        self.check_parent(store, req.entity, workflow, &ids, req.keys(), tenant.as_ref())
            .await
    }

    async fn check_bulk(&self, store: &dyn Store, req: &BulkRequest<'_>) -> GuardResult<()> {
        if req.operation == BulkOperation::CreateMany {
            for payload in req.payloads {
                self.check(store, &req.element(payload)).await?;
            }
            return Ok(());
        }

        if let Some(workflow) = Workflow::for_entity(req.entity) {
            let touches_status = req
                .payload
                .is_some_and(|p| p.contains(workflow.status_field()));
            if req.operation == BulkOperation::UpdateMany && touches_status {
                return Err(GuardError::BulkStatusChangeNotAllowed { entity: req.entity });
            }
            if !workflow.locks_after_initial() {
                return Ok(());
            }
            let rows = store.find_many(req.entity, &req.filter_or_all()).await?;
            if let Some(status) = rows
                .iter()
                .filter_map(|r| r.str_field(workflow.status_field()))
                .find(|s| !workflow.is_initial(s))
            {
                let fields = req
                    .payload
                    .map(|p| p.keys().map(str::to_string).collect())
                    .unwrap_or_default();
                return Err(frozen(req.entity, fields, status.to_string()));
            }
            return Ok(());
        }

        let Some((workflow, fk)) = parent_workflow(req.entity) else {
            return Ok(());
        };
        let rows = store.find_many(req.entity, &req.filter_or_all()).await?;
        let mut ids: Vec<&Value> = rows.iter().filter_map(|r| r.get(fk)).collect();
        if let Some(id) = req.payload.and_then(|p| p.set_value(fk)) {
            ids.push(id);
        }
        ids.sort_by_key(|v| v.to_string());
        ids.dedup();
        let fields = req
            .payload
            .map(|p| p.keys().map(str::to_string).collect())
            .unwrap_or_default();
        self.check_parent(store, req.entity, workflow, &ids, fields, req.tenant)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_state::SystemAction;
    use tally_store::MemoryStore;

    fn row(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn update<'a>(
        entity: EntityKind,
        payload: &'a Payload,
        current: &'a Record,
        regulatory: Option<&'a RegulatoryTransitionContext>,
    ) -> WriteRequest<'a> {
        WriteRequest {
            entity,
            operation: Operation::Update,
            payload: Some(payload),
            filter: None,
            current: Some(current),
            tenant: None,
            regulatory,
        }
    }

    #[tokio::test]
    async fn publish_without_source_is_illegal() {
        let store = MemoryStore::new();
        let current = row(json!({"id": "r-1", "status": "PENDING_REVIEW"}));
        let p = Payload::new().set("status", "PUBLISHED");
        let err = StatusTransitionGuard
            .check(&store, &update(EntityKind::RegulatoryRule, &p, &current, None))
            .await
            .unwrap_err();
        match err {
            GuardError::IllegalStatusTransition { from, to, allowed_targets, .. } => {
                assert_eq!(from.as_deref(), Some("PENDING_REVIEW"));
                assert_eq!(to, "PUBLISHED");
                assert!(allowed_targets.contains(&"APPROVED".to_string()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_from_approved_needs_source() {
        let store = MemoryStore::new();
        let current = row(json!({"id": "r-1", "status": "APPROVED"}));
        let p = Payload::new().set("status", "PUBLISHED");
        assert!(StatusTransitionGuard
            .check(&store, &update(EntityKind::RegulatoryRule, &p, &current, None))
            .await
            .is_err());
        let ctx = RegulatoryTransitionContext::with_source("gazette-2026-04");
        assert!(StatusTransitionGuard
            .check(&store, &update(EntityKind::RegulatoryRule, &p, &current, Some(&ctx)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn escape_hatch_and_bypass() {
        let store = MemoryStore::new();
        let published = row(json!({"id": "r-1", "status": "PUBLISHED"}));
        let p = Payload::new().set("status", "PENDING_REVIEW");
        let ctx = RegulatoryTransitionContext {
            system_action: Some(SystemAction::QuarantineDowngrade),
            ..RegulatoryTransitionContext::with_source("monitor")
        };
        assert!(StatusTransitionGuard
            .check(&store, &update(EntityKind::RegulatoryRule, &p, &published, Some(&ctx)))
            .await
            .is_ok());

        let draft = row(json!({"id": "r-2", "status": "DRAFT"}));
        let p = Payload::new().set("status", "PUBLISHED");
        let bypass = RegulatoryTransitionContext {
            bypass: true,
            ..Default::default()
        };
        assert!(StatusTransitionGuard
            .check(&store, &update(EntityKind::RegulatoryRule, &p, &draft, Some(&bypass)))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn payout_edge_restricts_columns() {
        let store = MemoryStore::new();
        let current = row(json!({"id": "po-1", "status": "DRAFT"}));
        let ok = Payload::new()
            .set("status", "LOCKED")
            .set("locked_at", "2026-02-01T09:00:00Z");
        assert!(StatusTransitionGuard
            .check(&store, &update(EntityKind::Payout, &ok, &current, None))
            .await
            .is_ok());

        let extra = ok.clone().set("extra_field", "x");
        let err = StatusTransitionGuard
            .check(&store, &update(EntityKind::Payout, &extra, &current, None))
            .await
            .unwrap_err();
        match err {
            GuardError::ImmutabilityViolation { fields, .. } => assert_eq!(fields, vec!["extra_field"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn locked_payout_and_lines_are_frozen() {
        let store = MemoryStore::new();
        store.seed(EntityKind::Payout, [row(json!({"id": "po-1", "status": "LOCKED"}))]);
        let current = row(json!({"id": "po-1", "status": "LOCKED"}));
        let p = Payload::new().set("memo", "late edit");
        assert!(StatusTransitionGuard
            .check(&store, &update(EntityKind::Payout, &p, &current, None))
            .await
            .is_err());

        let line = Payload::new().set("payout_id", "po-1").set("amount", "10");
        let req = WriteRequest {
            entity: EntityKind::PayoutLine,
            operation: Operation::Create,
            payload: Some(&line),
            filter: None,
            current: None,
            tenant: None,
            regulatory: None,
        };
        let err = StatusTransitionGuard.check(&store, &req).await.unwrap_err();
        assert!(err.to_string().contains("Payout LOCKED"));
    }

    #[tokio::test]
    async fn restating_the_current_status_is_allowed_after_lock() {
        let store = MemoryStore::new();
        let current = row(json!({"id": "po-1", "status": "LOCKED"}));
        let same = Payload::new().set("status", "LOCKED");
        assert!(StatusTransitionGuard
            .check(&store, &update(EntityKind::Payout, &same, &current, None))
            .await
            .is_ok());

        let same_with_edit = Payload::new().set("status", "LOCKED").set("memo", "late edit");
        let err = StatusTransitionGuard
            .check(&store, &update(EntityKind::Payout, &same_with_edit, &current, None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "IMMUTABILITY_VIOLATION");
    }

    #[tokio::test]
    async fn create_must_start_initial() {
        let store = MemoryStore::new();
        let p = Payload::new().set("status", "PUBLISHED");
        let req = WriteRequest {
            entity: EntityKind::RegulatoryRule,
            operation: Operation::Create,
            payload: Some(&p),
            filter: None,
            current: None,
            tenant: None,
            regulatory: None,
        };
        assert!(StatusTransitionGuard.check(&store, &req).await.is_err());

        let approved = Payload::new().set("status", "APPROVED");
        let ctx = RegulatoryTransitionContext {
            auto_approve: true,
            ..RegulatoryTransitionContext::with_source("import")
        };
        let req = WriteRequest {
            payload: Some(&approved),
            regulatory: Some(&ctx),
            ..req
        };
        assert!(StatusTransitionGuard.check(&store, &req).await.is_ok());
    }

    #[tokio::test]
    async fn bulk_status_change_is_refused() {
        let store = MemoryStore::new();
        let p = Payload::new().set("status", "CLOSED");
        let req = BulkRequest {
            entity: EntityKind::AccountingPeriod,
            operation: BulkOperation::UpdateMany,
            payloads: &[],
            payload: Some(&p),
            filter: None,
            tenant: None,
            regulatory: None,
        };
        let err = StatusTransitionGuard.check_bulk(&store, &req).await.unwrap_err();
        assert_eq!(err.code(), "BULK_STATUS_CHANGE_NOT_ALLOWED");
    }
}
