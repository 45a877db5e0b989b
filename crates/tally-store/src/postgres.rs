//! # PostgreSQL Store
//!
//! Every entity lives in one `records` table:
//!
//! ```text
//! records(entity TEXT, id TEXT, tenant_id TEXT, data JSONB, …)
//! ```
//!
//! Filters compile to SQL over `data ->> field`. Field names and values are
//! always bound parameters. Writes that apply relative updates
//! (`increment`, `decrement`) read the row `FOR UPDATE` inside a
//! transaction, apply the payload in Rust, and write the row back, so both
//! backends share one interpretation of a [`Payload`].

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Row};
use tally_core::{
    new_record_id, numeric_value, Clause, Condition, EntityKind, Filter, Payload, Record, RecordExt,
};

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Initialize the connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> StoreResult<Option<PgPool>> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set; guarded writes will go to the in-memory store \
                 and are lost on restart"
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("record store connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("record store migrations applied");

    Ok(Some(pool))
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_row(
        &self,
        conn: &mut sqlx::PgConnection,
        entity: EntityKind,
        data: &Payload,
    ) -> StoreResult<Record> {
        let mut record = data.to_record();
        let id = match record.record_id() {
            Some(id) => id.as_str().to_string(),
            None => {
                let id = new_record_id().as_str().to_string();
                record.insert("id".into(), Value::String(id.clone()));
                id
            }
        };
        let tenant = record.tenant_id().map(|t| t.as_str().to_string());
        let result = sqlx::query(
            "INSERT INTO records (entity, id, tenant_id, data) VALUES ($1, $2, $3, $4)
             ON CONFLICT (entity, id) DO NOTHING",
        )
        .bind(entity.as_str())
        .bind(&id)
        .bind(tenant)
        .bind(Value::Object(record.clone()))
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict { entity, id });
        }
        Ok(record)
    }

    async fn write_back(
        &self,
        conn: &mut sqlx::PgConnection,
        entity: EntityKind,
        id: &str,
        record: &Record,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE records SET data = $1, tenant_id = $2, updated_at = now()
             WHERE entity = $3 AND id = $4",
        )
        .bind(Value::Object(record.clone()))
        .bind(record.tenant_id().map(|t| t.as_str().to_string()))
        .bind(entity.as_str())
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Lock and fetch matching rows inside a transaction.
    async fn select_for_update(
        conn: &mut sqlx::PgConnection,
        entity: EntityKind,
        filter: &Filter,
        limit: Option<i64>,
    ) -> StoreResult<Vec<(String, Record)>> {
        let mut qb = select(entity, filter, "id, data");
        qb.push(" ORDER BY created_at, id");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        qb.push(" FOR UPDATE");
        let rows = qb.build().fetch_all(&mut *conn).await?;
        rows.into_iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let data: Value = row.try_get("data")?;
                Ok((id, into_record(entity, data)?))
            })
            .collect()
    }
}

fn into_record(entity: EntityKind, data: Value) -> StoreResult<Record> {
    match data {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Corrupt {
            entity,
            detail: format!("expected object, found {other}"),
        }),
    }
}

// ─── Filter compilation ─────────────────────────────────────────────

/// `SELECT <columns> FROM records WHERE entity = $1 AND <filter>`.
fn select<'a>(entity: EntityKind, filter: &Filter, columns: &str) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {columns} FROM records WHERE entity = "));
    qb.push_bind(entity.as_str());
    push_filter(&mut qb, filter);
    qb
}

/// Append ` AND <clause>` for every clause of the filter.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    for clause in filter.clauses() {
        qb.push(" AND ");
        push_clause(qb, clause);
    }
}

fn push_clause(qb: &mut QueryBuilder<'_, Postgres>, clause: &Clause) {
    match clause {
        Clause::Field { field, condition } => push_condition(qb, field, condition),
        Clause::Any(alternatives) if alternatives.is_empty() => {
            qb.push("FALSE");
        }
        Clause::Any(alternatives) => {
            qb.push("(");
            for (i, alt) in alternatives.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("(TRUE");
                push_filter(qb, alt);
                qb.push(")");
            }
            qb.push(")");
        }
    }
}

fn push_condition(qb: &mut QueryBuilder<'_, Postgres>, field: &str, condition: &Condition) {
    match condition {
        Condition::IsNull | Condition::Eq(Value::Null) => {
            qb.push("COALESCE(jsonb_typeof(data -> ")
                .push_bind(field.to_string())
                .push("), 'null') = 'null'");
        }
        Condition::NotNull | Condition::Ne(Value::Null) => {
            qb.push("COALESCE(jsonb_typeof(data -> ")
                .push_bind(field.to_string())
                .push("), 'null') <> 'null'");
        }
        Condition::Eq(v) => {
            qb.push("(data ->> ")
                .push_bind(field.to_string())
                .push(") = ")
                .push_bind(scalar_text(v));
        }
        Condition::Ne(v) => {
            qb.push("(data ->> ")
                .push_bind(field.to_string())
                .push(") IS DISTINCT FROM ")
                .push_bind(scalar_text(v));
        }
        Condition::In(values) => {
            let texts: Vec<String> = values
                .iter()
                .filter(|v| !v.is_null())
                .map(scalar_text)
                .collect();
            qb.push("(data ->> ")
                .push_bind(field.to_string())
                .push(") = ANY(")
                .push_bind(texts)
                .push(")");
        }
        Condition::Gt(v) => push_range(qb, field, ">", v),
        Condition::Gte(v) => push_range(qb, field, ">=", v),
        Condition::Lt(v) => push_range(qb, field, "<", v),
        Condition::Lte(v) => push_range(qb, field, "<=", v),
    }
}

/// Numeric bounds compare as `numeric`, anything else as text. Non-numeric
/// column values never satisfy a numeric bound.
fn push_range(qb: &mut QueryBuilder<'_, Postgres>, field: &str, op: &str, bound: &Value) {
    match numeric_value(bound) {
        Some(d) => {
            qb.push("(CASE WHEN (data ->> ")
                .push_bind(field.to_string())
                .push(r") ~ '^-?[0-9]+(\.[0-9]+)?$' THEN (data ->> ")
                .push_bind(field.to_string())
                .push(")::numeric END) ")
                .push(op)
                .push(" ")
                .push_bind(d);
        }
        None => {
            qb.push("(data ->> ")
                .push_bind(field.to_string())
                .push(") ")
                .push(op)
                .push(" ")
                .push_bind(scalar_text(bound));
        }
    }
}

/// The text form `->>` produces for a JSON scalar.
fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `SUM` over a decimal column, ignoring values that are not numbers.
fn sum_expr(qb: &mut QueryBuilder<'_, Postgres>, field: &str) {
    qb.push("COALESCE(SUM(CASE WHEN (data ->> ")
        .push_bind(field.to_string())
        .push(r") ~ '^-?[0-9]+(\.[0-9]+)?$' THEN (data ->> ")
        .push_bind(field.to_string())
        .push(")::numeric END), 0)");
}

#[async_trait]
impl Store for PgStore {
    async fn find_unique(&self, entity: EntityKind, filter: &Filter) -> StoreResult<Option<Record>> {
        self.find_first(entity, filter).await
    }

    async fn find_first(&self, entity: EntityKind, filter: &Filter) -> StoreResult<Option<Record>> {
        let mut qb = select(entity, filter, "data");
        qb.push(" ORDER BY created_at, id LIMIT 1");
        let row = qb.build().fetch_optional(&self.pool).await?;
        row.map(|r| into_record(entity, r.try_get("data")?))
            .transpose()
    }

    async fn find_many(&self, entity: EntityKind, filter: &Filter) -> StoreResult<Vec<Record>> {
        let mut qb = select(entity, filter, "data");
        qb.push(" ORDER BY created_at, id");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|r| into_record(entity, r.try_get("data")?))
            .collect()
    }

    async fn count(&self, entity: EntityKind, filter: &Filter) -> StoreResult<u64> {
        let mut qb = select(entity, filter, "COUNT(*) AS n");
        let n: i64 = qb.build().fetch_one(&self.pool).await?.try_get("n")?;
        Ok(n.max(0) as u64)
    }

    async fn create(&self, entity: EntityKind, data: &Payload) -> StoreResult<Record> {
        let mut conn = self.pool.acquire().await?;
        self.insert_row(&mut conn, entity, data).await
    }

    async fn create_many(&self, entity: EntityKind, data: &[Payload]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        for payload in data {
            self.insert_row(&mut tx, entity, payload).await?;
        }
        tx.commit().await?;
        Ok(data.len() as u64)
    }

    async fn update(&self, entity: EntityKind, filter: &Filter, data: &Payload) -> StoreResult<Record> {
        let mut tx = self.pool.begin().await?;
        let (id, mut record) = Self::select_for_update(&mut tx, entity, filter, Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound { entity })?;
        data.apply_to(&mut record);
        self.write_back(&mut tx, entity, &id, &record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn update_many(&self, entity: EntityKind, filter: &Filter, data: &Payload) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let rows = Self::select_for_update(&mut tx, entity, filter, None).await?;
        let n = rows.len() as u64;
        for (id, mut record) in rows {
            data.apply_to(&mut record);
            self.write_back(&mut tx, entity, &id, &record).await?;
        }
        tx.commit().await?;
        Ok(n)
    }

    async fn upsert(
        &self,
        entity: EntityKind,
        filter: &Filter,
        create: &Payload,
        update: &Payload,
    ) -> StoreResult<Record> {
        let mut tx = self.pool.begin().await?;
        let existing = Self::select_for_update(&mut tx, entity, filter, Some(1))
            .await?
            .into_iter()
            .next();
        let record = match existing {
            Some((id, mut record)) => {
                update.apply_to(&mut record);
                self.write_back(&mut tx, entity, &id, &record).await?;
                record
            }
            None => self.insert_row(&mut tx, entity, create).await?,
        };
        tx.commit().await?;
        Ok(record)
    }

    async fn delete(&self, entity: EntityKind, filter: &Filter) -> StoreResult<Record> {
        let mut tx = self.pool.begin().await?;
        let (id, record) = Self::select_for_update(&mut tx, entity, filter, Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound { entity })?;
        sqlx::query("DELETE FROM records WHERE entity = $1 AND id = $2")
            .bind(entity.as_str())
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn delete_many(&self, entity: EntityKind, filter: &Filter) -> StoreResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM records WHERE entity = ");
        qb.push_bind(entity.as_str());
        push_filter(&mut qb, filter);
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn aggregate_sum(&self, entity: EntityKind, filter: &Filter, field: &str) -> StoreResult<Decimal> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        sum_expr(&mut qb, field);
        qb.push(" AS total FROM records WHERE entity = ");
        qb.push_bind(entity.as_str());
        push_filter(&mut qb, filter);
        let total: Decimal = qb.build().fetch_one(&self.pool).await?.try_get("total")?;
        Ok(total)
    }

    async fn group_by_sum(
        &self,
        entity: EntityKind,
        filter: &Filter,
        group_field: &str,
        sum_field: &str,
    ) -> StoreResult<Vec<(Value, Decimal)>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT data -> ");
        qb.push_bind(group_field.to_string());
        qb.push(" AS key, ");
        sum_expr(&mut qb, sum_field);
        qb.push(" AS total FROM records WHERE entity = ");
        qb.push_bind(entity.as_str());
        push_filter(&mut qb, filter);
        qb.push(" GROUP BY 1 ORDER BY 1");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                let key: Option<Value> = row.try_get("key")?;
                let total: Decimal = row.try_get("total")?;
                Ok((key.unwrap_or(Value::Null), total))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sql(filter: &Filter) -> String {
        select(EntityKind::Invoice, filter, "data").sql().to_string()
    }

    #[test]
    fn empty_filter_only_scopes_entity() {
        assert_eq!(
            sql(&Filter::new()),
            "SELECT data FROM records WHERE entity = $1"
        );
    }

    #[test]
    fn field_names_are_bound() {
        let s = sql(&Filter::new().eq("tenant_id", "t-1"));
        assert_eq!(
            s,
            "SELECT data FROM records WHERE entity = $1 AND (data ->> $2) = $3"
        );
        assert!(!s.contains("tenant_id"));
    }

    #[test]
    fn disjunction_compiles_to_or_groups() {
        let f = Filter::new().any(vec![
            Filter::new().gte("issue_date", "2026-01-01"),
            Filter::new().eq("status", "DRAFT"),
        ]);
        let s = sql(&f);
        assert!(s.contains(" AND ((TRUE AND (data ->> $2) >= $3) OR (TRUE AND (data ->> $4) = $5))"));
    }

    #[test]
    fn empty_disjunction_matches_nothing() {
        assert!(sql(&Filter::new().any(vec![])).ends_with(" AND FALSE"));
    }

    #[test]
    fn numeric_bounds_cast() {
        let s = sql(&Filter::new().lt("quantity", json!(5)));
        assert!(s.contains("::numeric END) < $4"));
        let s = sql(&Filter::new().lt("business_date", "2026-03-01"));
        assert!(!s.contains("::numeric"));
    }

    #[test]
    fn null_checks_use_jsonb_typeof() {
        let s = sql(&Filter::new().with("signed_at", Condition::IsNull));
        assert!(s.contains("COALESCE(jsonb_typeof(data -> $2), 'null') = 'null'"));
    }
}
