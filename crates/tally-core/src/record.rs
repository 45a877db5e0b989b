//! # Records
//!
//! A stored row is a JSON object keyed by snake_case column name. The guard
//! layer only ever needs a handful of typed reads out of it (id, tenant,
//! status, a date, an amount), provided by [`RecordExt`].
//!
//! Amounts are decimal strings. Integers are accepted on read; floats are
//! accepted on read as a last resort but never written back.

use std::cmp::Ordering;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::identity::{RecordId, TenantId};
use crate::temporal::BusinessDate;

/// A stored row.
pub type Record = Map<String, Value>;

/// Typed accessors over a [`Record`].
pub trait RecordExt {
    /// The `id` column.
    fn record_id(&self) -> Option<RecordId>;
    /// The `tenant_id` column.
    fn tenant_id(&self) -> Option<TenantId>;
    /// A string column.
    fn str_field(&self, field: &str) -> Option<&str>;
    /// A date column, parsed.
    fn date_field(&self, field: &str) -> Option<BusinessDate>;
    /// A decimal column, parsed. Missing or null reads as `None`.
    fn decimal_field(&self, field: &str) -> Option<Decimal>;
    /// Whether a column is present and not null.
    fn is_set(&self, field: &str) -> bool;
}

impl RecordExt for Record {
    fn record_id(&self) -> Option<RecordId> {
        match self.get("id")? {
            Value::String(s) => Some(RecordId::new(s.clone())),
            Value::Number(n) => Some(RecordId::new(n.to_string())),
            _ => None,
        }
    }

    fn tenant_id(&self) -> Option<TenantId> {
        self.get("tenant_id").and_then(TenantId::from_value)
    }

    fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    fn date_field(&self, field: &str) -> Option<BusinessDate> {
        self.get(field).and_then(BusinessDate::from_value)
    }

    fn decimal_field(&self, field: &str) -> Option<Decimal> {
        self.get(field).and_then(decimal_from_value)
    }

    fn is_set(&self, field: &str) -> bool {
        matches!(self.get(field), Some(v) if !v.is_null())
    }
}

/// Parse a decimal out of a JSON string or number.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else if let Some(u) = n.as_u64() {
                Some(Decimal::from(u))
            } else {
                Decimal::from_str(&n.to_string()).ok()
            }
        }
        _ => None,
    }
}

/// Render a decimal for storage.
pub fn decimal_to_value(d: Decimal) -> Value {
    Value::String(d.normalize().to_string())
}

/// Order two JSON scalars.
///
/// Numbers and numeric strings compare as decimals so `"100.00"` and `100`
/// are equal. Other strings compare lexicographically, which is correct for
/// ISO-8601 dates. Mismatched or compound types are unordered.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (numeric_value(a), numeric_value(b)) {
        return Some(x.cmp(&y));
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Equality with the same numeric leniency as [`compare_values`].
pub fn values_equal(a: &Value, b: &Value) -> bool {
    a == b || compare_values(a, b) == Some(Ordering::Equal)
}

/// The decimal a scalar compares as, if it is numeric.
pub fn numeric_value(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(_) => decimal_from_value(v),
        Value::String(s) if looks_numeric(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

// Keeps ids like "0042" or dates from being read as numbers.
fn looks_numeric(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    !body.is_empty()
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.chars().filter(|c| *c == '.').count() <= 1
        && !(body.len() > 1 && body.starts_with('0') && !body.starts_with("0."))
}
