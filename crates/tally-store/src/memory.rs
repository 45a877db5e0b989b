//! # In-Memory Store
//!
//! Rows per entity in insertion order behind one `parking_lot::RwLock`.
//! Every operation takes the lock once, so each call is atomic with respect
//! to other calls on the same store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde_json::Value;
use tally_core::{new_record_id, EntityKind, Filter, Payload, Record, RecordExt};

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<EntityKind, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert rows as-is, bypassing id generation. Test fixtures use this
    /// to seed state the guarded client would refuse to create.
    pub fn seed(&self, entity: EntityKind, rows: impl IntoIterator<Item = Record>) {
        self.tables.write().entry(entity).or_default().extend(rows);
    }

    /// Every row of an entity, in insertion order.
    pub fn rows(&self, entity: EntityKind) -> Vec<Record> {
        self.tables.read().get(&entity).cloned().unwrap_or_default()
    }
}

fn materialize(entity: EntityKind, rows: &[Record], data: &Payload) -> StoreResult<Record> {
    let mut record = data.to_record();
    match record.record_id() {
        Some(id) => {
            let taken = rows.iter().any(|r| r.record_id().as_ref() == Some(&id));
            if taken {
                return Err(StoreError::Conflict {
                    entity,
                    id: id.as_str().to_string(),
                });
            }
        }
        None => {
            record.insert("id".into(), Value::String(new_record_id().as_str().to_string()));
        }
    }
    Ok(record)
}

fn sum_field(rows: &[&Record], field: &str) -> Decimal {
    rows.iter()
        .filter_map(|r| r.decimal_field(field))
        .fold(Decimal::ZERO, |acc, d| acc + d)
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_unique(&self, entity: EntityKind, filter: &Filter) -> StoreResult<Option<Record>> {
        self.find_first(entity, filter).await
    }

    async fn find_first(&self, entity: EntityKind, filter: &Filter) -> StoreResult<Option<Record>> {
        let tables = self.tables.read();
        Ok(tables
            .get(&entity)
            .and_then(|rows| rows.iter().find(|r| filter.matches(r)).cloned()))
    }

    async fn find_many(&self, entity: EntityKind, filter: &Filter) -> StoreResult<Vec<Record>> {
        let tables = self.tables.read();
        Ok(tables
            .get(&entity)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, entity: EntityKind, filter: &Filter) -> StoreResult<u64> {
        let tables = self.tables.read();
        Ok(tables
            .get(&entity)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).count() as u64)
            .unwrap_or(0))
    }

    async fn create(&self, entity: EntityKind, data: &Payload) -> StoreResult<Record> {
        let mut tables = self.tables.write();
        let rows = tables.entry(entity).or_default();
        let record = materialize(entity, rows.as_slice(), data)?;
        rows.push(record.clone());
        Ok(record)
    }

    async fn create_many(&self, entity: EntityKind, data: &[Payload]) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let rows = tables.entry(entity).or_default();
        let mut staged = Vec::with_capacity(data.len());
        for payload in data {
            let record = materialize(entity, rows.as_slice(), payload)?;
            let id = record.record_id();
            if staged.iter().any(|r: &Record| r.record_id() == id) {
                return Err(StoreError::Conflict {
                    entity,
                    id: id.map(|i| i.as_str().to_string()).unwrap_or_default(),
                });
            }
            staged.push(record);
        }
        let n = staged.len() as u64;
        rows.extend(staged);
        Ok(n)
    }

    async fn update(&self, entity: EntityKind, filter: &Filter, data: &Payload) -> StoreResult<Record> {
        let mut tables = self.tables.write();
        let row = tables
            .get_mut(&entity)
            .and_then(|rows| rows.iter_mut().find(|r| filter.matches(r)))
            .ok_or(StoreError::NotFound { entity })?;
        data.apply_to(row);
        Ok(row.clone())
    }

    async fn update_many(&self, entity: EntityKind, filter: &Filter, data: &Payload) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let mut n = 0;
        if let Some(rows) = tables.get_mut(&entity) {
            for row in rows.iter_mut().filter(|r| filter.matches(r)) {
                data.apply_to(row);
                n += 1;
            }
        }
        Ok(n)
    }

    async fn upsert(
        &self,
        entity: EntityKind,
        filter: &Filter,
        create: &Payload,
        update: &Payload,
    ) -> StoreResult<Record> {
        let mut tables = self.tables.write();
        let rows = tables.entry(entity).or_default();
        if let Some(row) = rows.iter_mut().find(|r| filter.matches(r)) {
            update.apply_to(row);
            return Ok(row.clone());
        }
        let record = materialize(entity, rows.as_slice(), create)?;
        rows.push(record.clone());
        Ok(record)
    }

    async fn delete(&self, entity: EntityKind, filter: &Filter) -> StoreResult<Record> {
        let mut tables = self.tables.write();
        let rows = tables
            .get_mut(&entity)
            .ok_or(StoreError::NotFound { entity })?;
        let idx = rows
            .iter()
            .position(|r| filter.matches(r))
            .ok_or(StoreError::NotFound { entity })?;
        Ok(rows.remove(idx))
    }

    async fn delete_many(&self, entity: EntityKind, filter: &Filter) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(&entity) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !filter.matches(r));
        Ok((before - rows.len()) as u64)
    }

    async fn aggregate_sum(&self, entity: EntityKind, filter: &Filter, field: &str) -> StoreResult<Decimal> {
        let tables = self.tables.read();
        let matched: Vec<&Record> = tables
            .get(&entity)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).collect())
            .unwrap_or_default();
        Ok(sum_field(&matched, field))
    }

    async fn group_by_sum(
        &self,
        entity: EntityKind,
        filter: &Filter,
        group_field: &str,
        sum_field_name: &str,
    ) -> StoreResult<Vec<(Value, Decimal)>> {
        let tables = self.tables.read();
        let mut groups: Vec<(Value, Vec<&Record>)> = Vec::new();
        for row in tables.get(&entity).into_iter().flatten() {
            if !filter.matches(row) {
                continue;
            }
            let key = row.get(group_field).cloned().unwrap_or(Value::Null);
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(row),
                None => groups.push((key, vec![row])),
            }
        }
        Ok(groups
            .into_iter()
            .map(|(key, members)| (key, sum_field(&members, sum_field_name)))
            .collect())
    }
}
