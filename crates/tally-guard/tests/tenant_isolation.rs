//! # Tenant Isolation
//!
//! A request running as tenant A can neither see nor change tenant B's rows,
//! even when its filter names tenant B or B's row id explicitly.

use std::sync::Arc;

use serde_json::json;
use tally_core::{EntityKind, Filter, Payload, Record, RecordExt};
use tally_guard::{context, GuardConfig, GuardError, GuardedStore, RequestContext};
use tally_store::MemoryStore;

fn row(v: serde_json::Value) -> Record {
    v.as_object().cloned().unwrap()
}

fn setup() -> (Arc<MemoryStore>, GuardedStore) {
    let mem = Arc::new(MemoryStore::new());
    mem.seed(
        EntityKind::Expense,
        [
            row(json!({"id": "ex-a", "tenant_id": "t-a", "amount": "10", "status": "DRAFT"})),
            row(json!({"id": "ex-b", "tenant_id": "t-b", "amount": "20", "status": "DRAFT"})),
        ],
    );
    let guarded = GuardedStore::new(mem.clone(), GuardConfig::default());
    (mem, guarded)
}

fn as_tenant(t: &str) -> RequestContext {
    RequestContext::for_tenant(t, "u-1")
}

#[tokio::test]
async fn reads_are_scoped() {
    let (_mem, store) = setup();
    context::run(as_tenant("t-a"), async {
        let all = store.find_many(EntityKind::Expense, &Filter::new()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].str_field("id"), Some("ex-a"));

        let forged = Filter::new().eq("tenant_id", "t-b");
        assert_eq!(store.count(EntityKind::Expense, &forged).await.unwrap(), 1);
        let rows = store.find_many(EntityKind::Expense, &forged).await.unwrap();
        assert!(rows.iter().all(|r| r.str_field("tenant_id") == Some("t-a")));

        let other = store
            .find_unique(EntityKind::Expense, &Filter::by_id("ex-b"))
            .await
            .unwrap();
        assert!(other.is_none());

        let total = store
            .aggregate_sum(EntityKind::Expense, &Filter::new(), "amount")
            .await
            .unwrap();
        assert_eq!(total.to_string(), "10");
    })
    .await;
}

#[tokio::test]
async fn writes_cannot_reach_another_tenant() {
    let (mem, store) = setup();
    context::run(as_tenant("t-a"), async {
        let err = store
            .update(EntityKind::Expense, &Filter::by_id("ex-b"), &Payload::new().set("amount", "0"))
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::NotFound { .. }));

        let err = store
            .delete(EntityKind::Expense, &Filter::by_id("ex-b").eq("tenant_id", "t-b"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        let n = store
            .update_many(EntityKind::Expense, &Filter::new(), &Payload::new().set("memo", "bulk"))
            .await
            .unwrap();
        assert_eq!(n, 1);
    })
    .await;

    let b = mem
        .rows(EntityKind::Expense)
        .into_iter()
        .find(|r| r.str_field("id") == Some("ex-b"))
        .unwrap();
    assert_eq!(b.str_field("amount"), Some("20"));
    assert!(!b.is_set("memo"));
}

#[tokio::test]
async fn creates_and_moves_are_pinned_to_the_caller() {
    let (mem, store) = setup();
    context::run(as_tenant("t-a"), async {
        let created = store
            .create(
                EntityKind::Expense,
                &Payload::new().set("amount", "5").set("tenant_id", "t-b"),
            )
            .await
            .unwrap();
        assert_eq!(created.str_field("tenant_id"), Some("t-a"));

        let moved = store
            .update(
                EntityKind::Expense,
                &Filter::by_id("ex-a"),
                &Payload::new().set("tenant_id", "t-b"),
            )
            .await
            .unwrap();
        assert_eq!(moved.str_field("tenant_id"), Some("t-a"));

        store
            .create_many(
                EntityKind::Expense,
                &[Payload::new().set("amount", "1"), Payload::new().set("amount", "2")],
            )
            .await
            .unwrap();
    })
    .await;

    let a_rows = mem
        .rows(EntityKind::Expense)
        .into_iter()
        .filter(|r| r.str_field("tenant_id") == Some("t-a"))
        .count();
    assert_eq!(a_rows, 4);
}

#[tokio::test]
async fn concurrent_requests_keep_their_own_tenant() {
    let (_mem, store) = setup();
    let store = Arc::new(store);
    let mut handles = Vec::new();
    for (tenant, expected) in [("t-a", "ex-a"), ("t-b", "ex-b")] {
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(context::run(as_tenant(tenant), async move {
                tokio::task::yield_now().await;
                let rows = store.find_many(EntityKind::Expense, &Filter::new()).await.unwrap();
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].str_field("id"), Some(expected));
            })));
        }
    }
    for h in handles {
        h.await.unwrap();
    }
}

#[tokio::test]
async fn global_entities_are_shared() {
    let (mem, store) = setup();
    mem.seed(
        EntityKind::RegulatoryRule,
        [row(json!({"id": "r-1", "code": "VAT-STD", "status": "PUBLISHED"}))],
    );
    context::run(as_tenant("t-a"), async {
        let rules = store.find_many(EntityKind::RegulatoryRule, &Filter::new()).await.unwrap();
        assert_eq!(rules.len(), 1);
    })
    .await;
}

#[tokio::test]
async fn without_context_no_scoping_is_applied() {
    let (_mem, store) = setup();
    let all = store.find_many(EntityKind::Expense, &Filter::new()).await.unwrap();
    assert_eq!(all.len(), 2);
}
