//! # Write Payloads
//!
//! A [`Payload`] is the data half of a create or update: column name →
//! [`FieldUpdate`]. Callers that speak the nested-object JSON dialect
//! (`{"status": {"set": "LOCKED"}}`, `{"invoice": {"connect": {"id": "…"}}}`)
//! go through [`Payload::from_json`], which decides the update kind once.
//! Guards then read `set_value()` and never look at raw JSON shapes.
//!
//! Relation writes are normalized onto the foreign-key column: a `connect`
//! on relation `invoice` becomes `FieldUpdate::Connect` on `invoice_id`.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::record::{decimal_from_value, decimal_to_value, Record};

/// How one column is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum FieldUpdate {
    /// Assign a value.
    Set(Value),
    /// Point a foreign key at an existing parent row.
    Connect(Value),
    /// Clear a foreign key.
    Disconnect,
    /// Add to a numeric column.
    Increment(Decimal),
    /// Subtract from a numeric column.
    Decrement(Decimal),
}

/// Column → update for one write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload(BTreeMap<String, FieldUpdate>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: assign a value.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), FieldUpdate::Set(value.into()));
        self
    }

    /// Builder: connect a foreign key column to a parent id.
    pub fn connect(mut self, foreign_key: impl Into<String>, id: impl Into<Value>) -> Self {
        self.0.insert(foreign_key.into(), FieldUpdate::Connect(id.into()));
        self
    }

    /// Insert or replace one update.
    pub fn insert(&mut self, field: impl Into<String>, update: FieldUpdate) {
        self.0.insert(field.into(), update);
    }

    /// Remove one column from the payload.
    pub fn remove(&mut self, field: &str) -> Option<FieldUpdate> {
        self.0.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&FieldUpdate> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Columns written by this payload.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The value a column is being assigned, for `Set` and `Connect`.
    ///
    /// Relative updates (`Increment`/`Decrement`) and `Disconnect` have no
    /// absolute value and return `None`.
    pub fn set_value(&self, field: &str) -> Option<&Value> {
        match self.0.get(field)? {
            FieldUpdate::Set(v) | FieldUpdate::Connect(v) => Some(v),
            _ => None,
        }
    }

    /// Apply the payload to a row in place.
    pub fn apply_to(&self, record: &mut Record) {
        for (field, update) in &self.0 {
            let next = match update {
                FieldUpdate::Set(v) | FieldUpdate::Connect(v) => v.clone(),
                FieldUpdate::Disconnect => Value::Null,
                FieldUpdate::Increment(d) | FieldUpdate::Decrement(d) => {
                    let current = record
                        .get(field)
                        .and_then(decimal_from_value)
                        .unwrap_or(Decimal::ZERO);
                    let delta = if matches!(update, FieldUpdate::Increment(_)) { *d } else { -*d };
                    decimal_to_value(current + delta)
                }
            };
            record.insert(field.clone(), next);
        }
    }

    /// Materialize as a fresh row (for creates).
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        self.apply_to(&mut record);
        record
    }

    /// Parse the nested-object JSON dialect.
    ///
    /// Recognized wrappers, each an object with exactly one key:
    /// `set`, `increment`, `decrement`, `connect` (`{"id": …}` or a bare id),
    /// `disconnect`. Anything else is a plain assignment.
    pub fn from_json(value: Value) -> Result<Self, CoreError> {
        let Value::Object(map) = value else {
            return Err(CoreError::InvalidPayload("payload must be a JSON object".into()));
        };
        let mut payload = Self::new();
        for (field, v) in map {
            match v {
                Value::Object(inner) if inner.len() == 1 => {
                    let (op, arg) = inner.into_iter().next().ok_or_else(|| {
                        CoreError::InvalidPayload(format!("empty wrapper on {field}"))
                    })?;
                    match op.as_str() {
                        "set" => payload.insert(field, FieldUpdate::Set(arg)),
                        "increment" | "decrement" => {
                            let d = decimal_from_value(&arg).ok_or_else(|| {
                                CoreError::InvalidAmount(format!("{op} on {field}: {arg}"))
                            })?;
                            let update = if op == "increment" {
                                FieldUpdate::Increment(d)
                            } else {
                                FieldUpdate::Decrement(d)
                            };
                            payload.insert(field, update);
                        }
                        "connect" => {
                            let id = match arg {
                                Value::Object(mut o) => o.remove("id").ok_or_else(|| {
                                    CoreError::InvalidPayload(format!("connect on {field} has no id"))
                                })?,
                                other => other,
                            };
                            payload.insert(foreign_key_for(&field), FieldUpdate::Connect(id));
                        }
                        "disconnect" => payload.insert(foreign_key_for(&field), FieldUpdate::Disconnect),
                        _ => {
                            let mut obj = serde_json::Map::new();
                            obj.insert(op, arg);
                            payload.insert(field, FieldUpdate::Set(Value::Object(obj)));
                        }
                    }
                }
                other => payload.insert(field, FieldUpdate::Set(other)),
            }
        }
        Ok(payload)
    }
}

fn foreign_key_for(relation: &str) -> String {
    if relation.ends_with("_id") {
        relation.to_string()
    } else {
        format!("{relation}_id")
    }
}
