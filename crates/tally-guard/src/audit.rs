//! # Audit Records
//!
//! One [`AuditRecord`] per successful single-record write to an audited
//! entity, holding the row before and after the write. The checksum is the
//! SHA-256 of the JCS-canonical JSON of
//! `{action, actor, entity, entity_id, reason, timestamp}`, so a stored
//! record can be re-verified from its own columns. Audit rows are
//! append-only.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tally_core::{
    CanonicalBytes, Checksum, CoreError, EntityKind, Payload, Record, RecordExt, TenantId,
    Timestamp, UserId,
};

use crate::guard::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl From<Operation> for AuditAction {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Create => Self::Create,
            Operation::Update => Self::Update,
            Operation::Delete => Self::Delete,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row snapshots around the write. `before` is absent for creates and
/// `after` for deletes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditChanges {
    pub before: Option<Record>,
    pub after: Option<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub tenant_id: Option<TenantId>,
    pub user_id: Option<UserId>,
    pub actor: String,
    pub action: AuditAction,
    pub entity: EntityKind,
    pub entity_id: String,
    pub changes: AuditChanges,
    pub reason: Option<String>,
    pub timestamp: Timestamp,
    /// Lowercase hex SHA-256.
    pub checksum: String,
}

/// The checksum over the identifying columns of an audit record.
pub fn compute_checksum(
    actor: &str,
    action: AuditAction,
    entity: EntityKind,
    entity_id: &str,
    reason: Option<&str>,
    timestamp: &Timestamp,
) -> Result<Checksum, CoreError> {
    let body = json!({
        "actor": actor,
        "action": action.as_str(),
        "entity": entity.as_str(),
        "entity_id": entity_id,
        "reason": reason,
        "timestamp": timestamp.to_iso8601(),
    });
    Ok(Checksum::of(&CanonicalBytes::new(&body)?))
}

/// Who performed a write and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub actor: String,
    pub user_id: Option<UserId>,
    pub reason: Option<String>,
}

impl Attribution {
    pub fn actor(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            user_id: None,
            reason: None,
        }
    }
}

impl AuditRecord {
    /// Build a record stamped now. The entity id is taken from the after
    /// row, or the before row for deletes.
    pub fn new(
        by: Attribution,
        action: AuditAction,
        entity: EntityKind,
        changes: AuditChanges,
    ) -> Result<Self, CoreError> {
        Self::at(by, action, entity, changes, Timestamp::now())
    }

    pub fn at(
        by: Attribution,
        action: AuditAction,
        entity: EntityKind,
        changes: AuditChanges,
        timestamp: Timestamp,
    ) -> Result<Self, CoreError> {
        let Attribution {
            actor,
            user_id,
            reason,
        } = by;
        let subject = changes.after.as_ref().or(changes.before.as_ref());
        let entity_id = subject
            .and_then(RecordExt::record_id)
            .map(|id| id.as_str().to_string())
            .unwrap_or_default();
        let tenant_id = subject.and_then(RecordExt::tenant_id);
        let checksum = compute_checksum(
            &actor,
            action,
            entity,
            &entity_id,
            reason.as_deref(),
            &timestamp,
        )?
        .to_hex();
        Ok(Self {
            tenant_id,
            user_id,
            actor,
            action,
            entity,
            entity_id,
            changes,
            reason,
            timestamp,
            checksum,
        })
    }

    /// Recompute the checksum from this record's columns and compare.
    pub fn verify(&self) -> bool {
        compute_checksum(
            &self.actor,
            self.action,
            self.entity,
            &self.entity_id,
            self.reason.as_deref(),
            &self.timestamp,
        )
        .is_ok_and(|c| c.matches_hex(&self.checksum))
    }

    /// The `AuditLog` row for this record.
    pub fn to_payload(&self) -> Payload {
        let snapshot = |r: &Option<Record>| r.clone().map(Value::Object).unwrap_or(Value::Null);
        let mut payload = Payload::new()
            .set("actor", self.actor.as_str())
            .set("action", self.action.as_str())
            .set("entity", self.entity.as_str())
            .set("entity_id", self.entity_id.as_str())
            .set("reason", self.reason.clone())
            .set(
                "changes",
                json!({
                    "before": snapshot(&self.changes.before),
                    "after": snapshot(&self.changes.after),
                }),
            )
            .set("timestamp", self.timestamp.to_iso8601())
            .set("checksum", self.checksum.as_str());
        if let Some(t) = &self.tenant_id {
            payload = payload.set("tenant_id", t.to_value());
        }
        if let Some(u) = &self.user_id {
            payload = payload.set("user_id", u.as_str());
        }
        payload
    }

    /// Read an `AuditLog` row back.
    pub fn from_row(row: &Record) -> Result<Self, CoreError> {
        let text = |field: &str| {
            row.str_field(field)
                .map(str::to_string)
                .ok_or_else(|| CoreError::InvalidPayload(format!("audit row missing {field}")))
        };
        let action = match text("action")?.as_str() {
            "CREATE" => AuditAction::Create,
            "UPDATE" => AuditAction::Update,
            "DELETE" => AuditAction::Delete,
            other => return Err(CoreError::InvalidPayload(format!("unknown audit action {other:?}"))),
        };
        let changes = row.get("changes");
        let snapshot = |field: &str| {
            changes
                .and_then(|c| c.get(field))
                .and_then(Value::as_object)
                .cloned()
        };
        Ok(Self {
            tenant_id: row.tenant_id(),
            user_id: row.str_field("user_id").map(UserId::new),
            actor: text("actor")?,
            action,
            entity: text("entity")?.parse()?,
            entity_id: text("entity_id")?,
            changes: AuditChanges {
                before: snapshot("before"),
                after: snapshot("after"),
            },
            reason: row.str_field("reason").map(str::to_string),
            timestamp: Timestamp::parse(&text("timestamp")?)?,
            checksum: text("checksum")?,
        })
    }
}
