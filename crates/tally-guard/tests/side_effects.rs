//! # Audit Trail and Operational Events
//!
//! Successful single-record writes leave a verifiable audit record and,
//! for qualifying transitions, exactly one operational event per key.

use std::sync::Arc;

use serde_json::json;
use tally_core::{EntityKind, Filter, Payload, Record, RecordExt};
use tally_guard::{context, AuditRecord, GuardConfig, GuardedStore, RequestContext};
use tally_store::{MemoryStore, Store};

fn row(v: serde_json::Value) -> Record {
    v.as_object().cloned().unwrap()
}

fn setup(config: GuardConfig) -> (Arc<MemoryStore>, GuardedStore) {
    let mem = Arc::new(MemoryStore::new());
    let guarded = GuardedStore::new(mem.clone(), config);
    (mem, guarded)
}

#[tokio::test]
async fn writes_are_audited_with_valid_checksums() {
    let (mem, store) = setup(GuardConfig::default());
    let ctx = RequestContext::for_tenant("t-1", "u-7").with_audit("accountant@t-1", Some("month-end fix".into()));
    context::run(ctx, async {
        let created = store
            .create(EntityKind::Expense, &Payload::new().set("amount", "12.50"))
            .await
            .unwrap();
        let id = created.str_field("id").unwrap().to_string();
        store
            .update(EntityKind::Expense, &Filter::by_id(id.as_str()), &Payload::new().set("amount", "13.00"))
            .await
            .unwrap();
        store.delete(EntityKind::Expense, &Filter::by_id(id.as_str())).await.unwrap();
    })
    .await;
    store.flush().await;

    let audit: Vec<AuditRecord> = mem
        .rows(EntityKind::AuditLog)
        .iter()
        .map(|r| AuditRecord::from_row(r).unwrap())
        .collect();
    assert_eq!(audit.len(), 3);
    let actions: Vec<&str> = audit.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, ["CREATE", "UPDATE", "DELETE"]);
    for record in &audit {
        assert!(record.verify());
        assert_eq!(record.actor, "accountant@t-1");
        assert_eq!(record.reason.as_deref(), Some("month-end fix"));
        assert_eq!(record.entity, EntityKind::Expense);
        assert_eq!(record.user_id.as_ref().map(|u| u.as_str()), Some("u-7"));
    }
    let update = &audit[1];
    assert_eq!(update.changes.before.as_ref().and_then(|b| b.str_field("amount")), Some("12.50"));
    assert_eq!(update.changes.after.as_ref().and_then(|a| a.str_field("amount")), Some("13.00"));
    assert!(audit[2].changes.after.is_none());
    store.shutdown().await;
}

#[tokio::test]
async fn actor_falls_back_to_user_then_default() {
    let (mem, store) = setup(GuardConfig::default());
    context::run(RequestContext::for_tenant("t-1", "u-7"), async {
        store.create(EntityKind::Asset, &Payload::new().set("name", "Laptop")).await.unwrap();
    })
    .await;
    store.create(EntityKind::Asset, &Payload::new().set("name", "Desk")).await.unwrap();
    store.flush().await;

    let actors: Vec<String> = mem
        .rows(EntityKind::AuditLog)
        .iter()
        .filter_map(|r| r.str_field("actor").map(str::to_string))
        .collect();
    assert_eq!(actors, ["u-7", "system"]);
}

#[tokio::test]
async fn refused_writes_and_disabled_audit_leave_no_trail() {
    let (mem, store) = setup(GuardConfig {
        audit_enabled: false,
        ..GuardConfig::default()
    });
    context::run(RequestContext::for_tenant("t-1", "u-1"), async {
        store.create(EntityKind::Expense, &Payload::new().set("amount", "1")).await.unwrap();
    })
    .await;
    store.flush().await;
    assert!(mem.rows(EntityKind::AuditLog).is_empty());

    let (mem, store) = setup(GuardConfig::default());
    context::run(RequestContext::for_tenant("t-1", "u-1"), async {
        let refused = store
            .create(EntityKind::CashOut, &Payload::new().set("amount", "1").set("business_date", "2026-06-01"))
            .await;
        assert!(refused.is_err());
    })
    .await;
    store.flush().await;
    assert!(mem.rows(EntityKind::AuditLog).is_empty());
}

#[tokio::test]
async fn invoice_issue_event_is_stored_once() {
    let (mem, store) = setup(GuardConfig::default());
    mem.seed(
        EntityKind::Invoice,
        [row(json!({"id": "inv-1", "tenant_id": "t-1", "status": "DRAFT"}))],
    );
    let issue = Payload::new().set("status", "ISSUED");
    context::run(RequestContext::for_tenant("t-1", "u-1"), async {
        store.update(EntityKind::Invoice, &Filter::by_id("inv-1"), &issue).await.unwrap();
        // A retried request replays the same transition against the raw row.
        store
            .raw()
            .update(EntityKind::Invoice, &Filter::by_id("inv-1"), &Payload::new().set("status", "DRAFT"))
            .await
            .unwrap();
        store.update(EntityKind::Invoice, &Filter::by_id("inv-1"), &issue).await.unwrap();
    })
    .await;
    store.flush().await;

    let events = mem.rows(EntityKind::OperationalEvent);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.str_field("event_type"), Some("INVOICE_ISSUED"));
    assert_eq!(event.str_field("source_type"), Some("Invoice"));
    assert_eq!(event.str_field("source_id"), Some("inv-1"));
    assert_eq!(event.tenant_id().map(|t| t.as_str().to_string()).as_deref(), Some("t-1"));
}

#[tokio::test]
async fn events_can_be_disabled() {
    let (mem, store) = setup(GuardConfig {
        events_enabled: false,
        ..GuardConfig::default()
    });
    context::run(RequestContext::for_tenant("t-1", "u-1"), async {
        store
            .create(EntityKind::BankTransaction, &Payload::new().set("amount", "3"))
            .await
            .unwrap();
    })
    .await;
    store.flush().await;
    assert!(mem.rows(EntityKind::OperationalEvent).is_empty());
    assert_eq!(mem.rows(EntityKind::AuditLog).len(), 1);
}
