//! # Filters
//!
//! The predicate language shared by the store and the guards. A [`Filter`]
//! is a conjunction of clauses; [`Clause::Any`] nests a disjunction of
//! filters, which is all the guards need (the bulk period check is
//! "caller predicate AND tenant AND (date in range 1 OR date in range 2 …)").
//!
//! `Filter::matches` is the reference semantics. `MemoryStore` uses it
//! directly and `PgStore` compiles the same tree to SQL.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{compare_values, values_equal, Record};
use std::cmp::Ordering;

/// A condition on a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    IsNull,
    NotNull,
}

impl Condition {
    /// Evaluate against a column value (`None` when the column is absent).
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let actual_or_null = actual.unwrap_or(&Value::Null);
        match self {
            Self::Eq(v) => values_equal(actual_or_null, v),
            Self::Ne(v) => !values_equal(actual_or_null, v),
            Self::In(vs) => vs.iter().any(|v| values_equal(actual_or_null, v)),
            Self::Gt(v) => ordered(actual, v, |o| o == Ordering::Greater),
            Self::Gte(v) => ordered(actual, v, |o| o != Ordering::Less),
            Self::Lt(v) => ordered(actual, v, |o| o == Ordering::Less),
            Self::Lte(v) => ordered(actual, v, |o| o != Ordering::Greater),
            Self::IsNull => actual_or_null.is_null(),
            Self::NotNull => !actual_or_null.is_null(),
        }
    }
}

fn ordered(actual: Option<&Value>, bound: &Value, pred: impl Fn(Ordering) -> bool) -> bool {
    match actual {
        Some(a) if !a.is_null() => compare_values(a, bound).map(pred).unwrap_or(false),
        _ => false,
    }
}

/// One conjunct of a [`Filter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    /// A condition on one column.
    Field { field: String, condition: Condition },
    /// Matches when any of the nested filters matches. An empty list
    /// matches nothing.
    Any(Vec<Filter>),
}

/// A conjunction of clauses. The empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    /// The empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on primary key.
    pub fn by_id(id: impl Into<Value>) -> Self {
        Self::new().eq("id", id)
    }

    /// Add an arbitrary condition.
    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.clauses.push(Clause::Field {
            field: field.into(),
            condition,
        });
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Eq(value.into()))
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Ne(value.into()))
    }

    pub fn in_values(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(field, Condition::In(values))
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Gte(value.into()))
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Lte(value.into()))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Lt(value.into()))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Gt(value.into()))
    }

    /// Add a disjunction.
    pub fn any(mut self, alternatives: Vec<Filter>) -> Self {
        self.clauses.push(Clause::Any(alternatives));
        self
    }

    /// Conjoin another filter.
    pub fn and(mut self, other: Filter) -> Self {
        self.clauses.extend(other.clauses);
        self
    }

    /// Drop every top-level clause on `field`.
    pub fn without_field(mut self, field: &str) -> Self {
        self.clauses
            .retain(|c| !matches!(c, Clause::Field { field: f, .. } if f == field));
        self
    }

    /// The value of the first top-level equality clause on `field`.
    pub fn eq_value(&self, field: &str) -> Option<&Value> {
        self.clauses.iter().find_map(|c| match c {
            Clause::Field {
                field: f,
                condition: Condition::Eq(v),
            } if f == field => Some(v),
            _ => None,
        })
    }

    /// The clauses of this filter.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate against a record.
    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Field { field, condition } => condition.matches(record.get(field)),
            Clause::Any(alternatives) => alternatives.iter().any(|f| f.matches(record)),
        })
    }
}
