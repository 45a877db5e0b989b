//! # Write Guard Chain
//!
//! Every mutating call on [`GuardedStore`](crate::GuardedStore) is turned
//! into a [`WriteRequest`] (single record) or [`BulkRequest`] and passed
//! through the guards in registration order. The first guard to return an
//! error aborts the write before it reaches storage.
//!
//! Single-record update and delete requests carry the current row, fetched
//! once under the tenant-scoped filter, so guards do not each re-read it.
//! An upsert is presented as an update when the row exists and as a create
//! otherwise.

use async_trait::async_trait;
use tally_core::{EntityKind, Filter, Payload, Record, TenantId};
use tally_state::RegulatoryTransitionContext;
use tally_store::Store;

use crate::error::GuardResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkOperation {
    CreateMany,
    UpdateMany,
    DeleteMany,
}

impl BulkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateMany => "CREATE_MANY",
            Self::UpdateMany => "UPDATE_MANY",
            Self::DeleteMany => "DELETE_MANY",
        }
    }

    /// The single-record operation each element corresponds to.
    pub fn element_operation(&self) -> Operation {
        match self {
            Self::CreateMany => Operation::Create,
            Self::UpdateMany => Operation::Update,
            Self::DeleteMany => Operation::Delete,
        }
    }
}

/// A single-record write as seen by the guards.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub entity: EntityKind,
    pub operation: Operation,
    /// Create or update data. `None` for deletes.
    pub payload: Option<&'a Payload>,
    /// The tenant-scoped filter the caller supplied. `None` for creates.
    pub filter: Option<&'a Filter>,
    /// The row as it is before the write. `None` for creates.
    pub current: Option<&'a Record>,
    /// Tenant from the request context.
    pub tenant: Option<&'a TenantId>,
    pub regulatory: Option<&'a RegulatoryTransitionContext>,
}

impl<'a> WriteRequest<'a> {
    /// Columns written by this request, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.payload
            .map(|p| p.keys().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// The row as it will look after the write.
    pub fn merged(&self) -> Record {
        let mut row = self.current.cloned().unwrap_or_default();
        if let Some(payload) = self.payload {
            payload.apply_to(&mut row);
        }
        row
    }
}

/// A bulk write as seen by the guards.
#[derive(Debug, Clone, Copy)]
pub struct BulkRequest<'a> {
    pub entity: EntityKind,
    pub operation: BulkOperation,
    /// Elements of a `create_many`. Empty otherwise.
    pub payloads: &'a [Payload],
    /// Data of an `update_many`.
    pub payload: Option<&'a Payload>,
    /// Tenant-scoped filter of an `update_many` / `delete_many`.
    pub filter: Option<&'a Filter>,
    pub tenant: Option<&'a TenantId>,
    pub regulatory: Option<&'a RegulatoryTransitionContext>,
}

impl<'a> BulkRequest<'a> {
    /// The single-record create request for one `create_many` element.
    pub fn element(&self, payload: &'a Payload) -> WriteRequest<'a> {
        WriteRequest {
            entity: self.entity,
            operation: Operation::Create,
            payload: Some(payload),
            filter: None,
            current: None,
            tenant: self.tenant,
            regulatory: self.regulatory,
        }
    }

    /// The filter of an `update_many` / `delete_many`, or the empty filter.
    pub fn filter_or_all(&self) -> Filter {
        self.filter.cloned().unwrap_or_default()
    }
}

#[async_trait]
pub trait WriteGuard: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn check(&self, store: &dyn Store, req: &WriteRequest<'_>) -> GuardResult<()>;

    async fn check_bulk(&self, store: &dyn Store, req: &BulkRequest<'_>) -> GuardResult<()>;
}
