//! # Identity Newtypes
//!
//! Tenant, user and record identifiers. Tenants and users are issued by the
//! authentication layer and are opaque strings here; record ids are UUIDv4
//! strings minted by [`new_record_id`] when a create payload carries none.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifier of an isolated customer/company.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

/// Identifier of an authenticated user acting inside a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Primary key of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl TenantId {
    /// Wrap a tenant identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// JSON form used in filters and payloads.
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }

    /// Read a tenant id from a JSON value. Only non-empty strings qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_str() {
            Some(s) if !s.is_empty() => Some(Self(s.to_string())),
            _ => None,
        }
    }
}

impl UserId {
    /// Wrap a user identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl RecordId {
    /// Wrap a record identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Mint a fresh record id.
pub fn new_record_id() -> RecordId {
    RecordId(Uuid::new_v4().to_string())
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
