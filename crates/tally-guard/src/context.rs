//! # Scoped Request Context
//!
//! Tenant, audit and regulatory provenance for the request being served,
//! visible to every nested call in the same task and nowhere else. Backed
//! by a `tokio::task_local!`, so concurrent requests never observe each
//! other's context and spawned tasks start without one.
//!
//! Outside [`run`] / [`run_sync`], [`current`] returns `None`. The guards
//! treat that as "no tenant": no implicit tenant scoping, and data-derived
//! fallbacks for period and immutability checks.

use std::cell::RefCell;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tally_core::{TenantId, UserId};
use tally_state::RegulatoryTransitionContext;

/// The tenant and user a request acts for. Immutable for the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub user_id: UserId,
}

/// Who is recorded as the actor in audit records, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub actor: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant: Option<TenantContext>,
    pub audit: Option<AuditContext>,
    pub regulatory: Option<RegulatoryTransitionContext>,
}

impl RequestContext {
    pub fn for_tenant(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant: Some(TenantContext {
                tenant_id: TenantId::new(tenant_id),
                user_id: UserId::new(user_id),
            }),
            ..Self::default()
        }
    }

    pub fn with_audit(mut self, actor: impl Into<String>, reason: Option<String>) -> Self {
        self.audit = Some(AuditContext {
            actor: actor.into(),
            reason,
        });
        self
    }

    pub fn with_regulatory(mut self, regulatory: RegulatoryTransitionContext) -> Self {
        self.regulatory = Some(regulatory);
        self
    }

    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant.as_ref().map(|t| &t.tenant_id)
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.tenant.as_ref().map(|t| &t.user_id)
    }
}

tokio::task_local! {
    static CONTEXT: RefCell<RequestContext>;
}

/// Run a future with `ctx` as the active request context.
pub async fn run<F: Future>(ctx: RequestContext, fut: F) -> F::Output {
    CONTEXT.scope(RefCell::new(ctx), fut).await
}

/// Run a synchronous closure with `ctx` as the active request context.
pub fn run_sync<R>(ctx: RequestContext, f: impl FnOnce() -> R) -> R {
    CONTEXT.sync_scope(RefCell::new(ctx), f)
}

/// A snapshot of the active context, if any.
pub fn current() -> Option<RequestContext> {
    CONTEXT.try_with(|c| c.borrow().clone()).ok()
}

/// The active tenant, if any.
pub fn tenant_id() -> Option<TenantId> {
    CONTEXT
        .try_with(|c| c.borrow().tenant_id().cloned())
        .ok()
        .flatten()
}

/// Mutate the active context in place. Returns `false` outside a scope.
///
/// Guards read the context as a snapshot per operation, so a mutation only
/// affects operations started after it.
pub fn update(f: impl FnOnce(&mut RequestContext)) -> bool {
    CONTEXT.try_with(|c| f(&mut c.borrow_mut())).is_ok()
}
