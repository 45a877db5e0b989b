//! # Cash Balance
//!
//! The running balance `Σ cash in − Σ cash out` never goes negative through
//! the guarded store, closed days are frozen, and a refused write leaves the
//! store exactly as it was.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tally_core::{EntityKind, Filter, Payload, Record};
use tally_guard::{context, GuardConfig, GuardError, GuardedStore, RequestContext};
use tally_store::{MemoryStore, Store};

fn row(v: serde_json::Value) -> Record {
    v.as_object().cloned().unwrap()
}

fn setup() -> (Arc<MemoryStore>, GuardedStore) {
    let mem = Arc::new(MemoryStore::new());
    mem.seed(
        EntityKind::CashIn,
        [row(json!({"id": "ci-0", "tenant_id": "t-1", "amount": "60.00", "business_date": "2026-05-04"}))],
    );
    let guarded = GuardedStore::new(mem.clone(), GuardConfig::default());
    (mem, guarded)
}

fn ctx() -> RequestContext {
    RequestContext::for_tenant("t-1", "cashier-1")
}

async fn balance(mem: &MemoryStore) -> Decimal {
    let f = Filter::new().eq("tenant_id", "t-1");
    let inflow = mem.aggregate_sum(EntityKind::CashIn, &f, "amount").await.unwrap();
    let outflow = mem.aggregate_sum(EntityKind::CashOut, &f, "amount").await.unwrap();
    inflow - outflow
}

fn cash(amount: &str) -> Payload {
    Payload::new().set("amount", amount).set("business_date", "2026-05-05")
}

#[tokio::test]
async fn overdraw_then_top_up() {
    let (mem, store) = setup();
    context::run(ctx(), async {
        let before_in = mem.rows(EntityKind::CashIn);
        let err = store.create(EntityKind::CashOut, &cash("100.00")).await.unwrap_err();
        match err {
            GuardError::CashBalanceWouldGoNegative { balance, projected } => {
                assert_eq!(balance, dec!(60.00));
                assert_eq!(projected, dec!(-40.00));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(mem.rows(EntityKind::CashOut).is_empty());
        assert_eq!(mem.rows(EntityKind::CashIn), before_in);

        store.create(EntityKind::CashIn, &cash("100.00")).await.unwrap();
        store.create(EntityKind::CashOut, &cash("100.00")).await.unwrap();
    })
    .await;
    assert_eq!(balance(&mem).await, dec!(60.00));
}

#[tokio::test]
async fn shrinking_an_inflow_is_balance_checked() {
    let (mem, store) = setup();
    mem.seed(
        EntityKind::CashOut,
        [row(json!({"id": "co-0", "tenant_id": "t-1", "amount": "50.00", "business_date": "2026-05-04"}))],
    );
    context::run(ctx(), async {
        let err = store
            .update(EntityKind::CashIn, &Filter::by_id("ci-0"), &Payload::new().set("amount", "40.00"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CASH_BALANCE_WOULD_GO_NEGATIVE");

        store
            .update(EntityKind::CashIn, &Filter::by_id("ci-0"), &Payload::new().set("amount", "50.00"))
            .await
            .unwrap();

        let err = store.delete(EntityKind::CashIn, &Filter::by_id("ci-0")).await.unwrap_err();
        assert_eq!(err.code(), "CASH_BALANCE_WOULD_GO_NEGATIVE");

        store.delete(EntityKind::CashOut, &Filter::by_id("co-0")).await.unwrap();
    })
    .await;
    assert_eq!(balance(&mem).await, dec!(50.00));
}

#[tokio::test]
async fn closed_day_refuses_cash_writes() {
    let (mem, store) = setup();
    context::run(ctx(), async {
        store
            .create(EntityKind::CashDayClose, &Payload::new().set("business_date", "2026-05-04"))
            .await
            .unwrap();

        let late = Payload::new().set("amount", "5").set("business_date", "2026-05-04");
        match store.create(EntityKind::CashIn, &late).await.unwrap_err() {
            GuardError::CashDayClosed { business_date } => assert_eq!(business_date.to_string(), "2026-05-04"),
            other => panic!("unexpected {other:?}"),
        }

        let err = store
            .update(
                EntityKind::CashIn,
                &Filter::by_id("ci-0"),
                &Payload::new().set("business_date", "2026-05-06"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CASH_DAY_CLOSED");

        let err = store
            .update_many(EntityKind::CashDayClose, &Filter::new(), &Payload::new().set("note", "reopen"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GuardError::BulkCashMutationNotAllowed { .. } | GuardError::ImmutabilityViolation { .. }
        ));

        let err = store
            .delete(EntityKind::CashDayClose, &Filter::new().eq("business_date", "2026-05-04"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "IMMUTABILITY_VIOLATION");

        store.create(EntityKind::CashIn, &cash("5")).await.unwrap();
    })
    .await;
    assert_eq!(mem.rows(EntityKind::CashDayClose).len(), 1);
}

#[tokio::test]
async fn bulk_cash_writes_are_refused() {
    let (mem, store) = setup();
    context::run(ctx(), async {
        let err = store
            .create_many(EntityKind::CashIn, &[cash("1"), cash("2")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BULK_CASH_MUTATION_NOT_ALLOWED");

        let err = store.delete_many(EntityKind::CashIn, &Filter::new()).await.unwrap_err();
        assert_eq!(err.code(), "BULK_CASH_MUTATION_NOT_ALLOWED");
    })
    .await;
    assert_eq!(mem.rows(EntityKind::CashIn).len(), 1);
}
