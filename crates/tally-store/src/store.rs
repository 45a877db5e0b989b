//! # The Store Trait
//!
//! Operation set of the raw data-access client. The guarded client in
//! `tally-guard` implements the same surface on top of any `Store`.
//!
//! Single-row `update` and `delete` act on the first row matching the
//! filter and fail with [`StoreError::NotFound`](crate::StoreError) when
//! nothing matches. Bulk forms return the number of rows affected.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tally_core::{EntityKind, Filter, Payload, Record};

use crate::error::StoreResult;

pub type SharedStore = Arc<dyn Store>;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn find_unique(&self, entity: EntityKind, filter: &Filter) -> StoreResult<Option<Record>>;

    async fn find_first(&self, entity: EntityKind, filter: &Filter) -> StoreResult<Option<Record>>;

    async fn find_many(&self, entity: EntityKind, filter: &Filter) -> StoreResult<Vec<Record>>;

    async fn count(&self, entity: EntityKind, filter: &Filter) -> StoreResult<u64>;

    /// Insert one row. An `id` is generated when the payload has none.
    async fn create(&self, entity: EntityKind, data: &Payload) -> StoreResult<Record>;

    async fn create_many(&self, entity: EntityKind, data: &[Payload]) -> StoreResult<u64>;

    async fn update(&self, entity: EntityKind, filter: &Filter, data: &Payload) -> StoreResult<Record>;

    async fn update_many(&self, entity: EntityKind, filter: &Filter, data: &Payload) -> StoreResult<u64>;

    /// Update the first row matching `filter`, or create one from `create`.
    async fn upsert(
        &self,
        entity: EntityKind,
        filter: &Filter,
        create: &Payload,
        update: &Payload,
    ) -> StoreResult<Record>;

    async fn delete(&self, entity: EntityKind, filter: &Filter) -> StoreResult<Record>;

    async fn delete_many(&self, entity: EntityKind, filter: &Filter) -> StoreResult<u64>;

    /// Sum of a decimal column over matching rows. Missing values count as zero.
    async fn aggregate_sum(&self, entity: EntityKind, filter: &Filter, field: &str) -> StoreResult<Decimal>;

    /// `SELECT group_field, SUM(sum_field) … GROUP BY group_field`.
    async fn group_by_sum(
        &self,
        entity: EntityKind,
        filter: &Filter,
        group_field: &str,
        sum_field: &str,
    ) -> StoreResult<Vec<(Value, Decimal)>>;
}
