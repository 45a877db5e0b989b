//! # Tenant Isolation
//!
//! The first gate. For tenant-scoped entities with a tenant in context:
//!
//! - multi-record reads and every write filter get `tenant_id = <tenant>`,
//!   replacing any `tenant_id` clause the caller wrote;
//! - create payloads (and every element of a bulk create) get `tenant_id`
//!   injected, and update payloads have it overwritten;
//! - single-record reads are post-checked and hidden on mismatch.
//!
//! Entities outside the allow-list (`EntityKind::is_tenant_scoped`) and
//! requests without a tenant pass through untouched.

use tally_core::{EntityKind, Filter, FieldUpdate, Payload, Record, RecordExt, TenantId};

const TENANT_FIELD: &str = "tenant_id";

/// Scope a read or write filter to the tenant.
pub fn scope_filter(entity: EntityKind, filter: &Filter, tenant: Option<&TenantId>) -> Filter {
    match tenant {
        Some(t) if entity.is_tenant_scoped() => filter
            .clone()
            .without_field(TENANT_FIELD)
            .eq(TENANT_FIELD, t.to_value()),
        _ => filter.clone(),
    }
}

/// Inject the tenant into a create payload.
pub fn scope_create(entity: EntityKind, payload: &Payload, tenant: Option<&TenantId>) -> Payload {
    let mut scoped = payload.clone();
    if let Some(t) = tenant.filter(|_| entity.is_tenant_scoped()) {
        scoped.insert(TENANT_FIELD, FieldUpdate::Set(t.to_value()));
    }
    scoped
}

/// Overwrite any tenant in an update payload so rows cannot change owner.
pub fn scope_update(entity: EntityKind, payload: &Payload, tenant: Option<&TenantId>) -> Payload {
    let mut scoped = payload.clone();
    if let Some(t) = tenant.filter(|_| entity.is_tenant_scoped()) {
        if scoped.contains(TENANT_FIELD) {
            scoped.insert(TENANT_FIELD, FieldUpdate::Set(t.to_value()));
        }
    }
    scoped
}

/// Whether a fetched row may be shown to the tenant.
pub fn is_visible(entity: EntityKind, record: &Record, tenant: Option<&TenantId>) -> bool {
    match tenant {
        Some(t) if entity.is_tenant_scoped() => record.tenant_id().as_ref() == Some(t),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn t(id: &str) -> TenantId {
        TenantId::new(id)
    }

    #[test]
    fn caller_tenant_clause_is_replaced() {
        let f = Filter::new().eq("tenant_id", "t-b").eq("id", "inv-1");
        let scoped = scope_filter(EntityKind::Invoice, &f, Some(&t("t-a")));
        assert_eq!(scoped.eq_value("tenant_id"), Some(&json!("t-a")));
        assert_eq!(scoped.clauses().len(), 2);
    }

    #[test]
    fn global_entities_pass_through() {
        let f = Filter::new().eq("code", "VAT-1");
        assert_eq!(scope_filter(EntityKind::RegulatoryRule, &f, Some(&t("t-a"))), f);
        let p = Payload::new().set("code", "VAT-1");
        assert_eq!(scope_create(EntityKind::RegulatoryRule, &p, Some(&t("t-a"))), p);
    }

    #[test]
    fn no_tenant_no_scoping() {
        let f = Filter::new().eq("id", "x");
        assert_eq!(scope_filter(EntityKind::Invoice, &f, None), f);
    }

    #[test]
    fn create_injects_update_overwrites() {
        let p = Payload::new().set("amount", "10").set("tenant_id", "t-b");
        let created = scope_create(EntityKind::CashIn, &p, Some(&t("t-a")));
        assert_eq!(created.set_value("tenant_id"), Some(&json!("t-a")));

        let update = Payload::new().set("note", "x");
        let scoped = scope_update(EntityKind::CashIn, &update, Some(&t("t-a")));
        assert!(!scoped.contains("tenant_id"));

        let moving = Payload::new().set("tenant_id", "t-b");
        let scoped = scope_update(EntityKind::CashIn, &moving, Some(&t("t-a")));
        assert_eq!(scoped.set_value("tenant_id"), Some(&json!("t-a")));
    }

    #[test]
    fn visibility() {
        let row: Record = json!({"id": "1", "tenant_id": "t-b"}).as_object().cloned().unwrap();
        assert!(!is_visible(EntityKind::Invoice, &row, Some(&t("t-a"))));
        assert!(is_visible(EntityKind::Invoice, &row, Some(&t("t-b"))));
        assert!(is_visible(EntityKind::Invoice, &row, None));
    }
}
