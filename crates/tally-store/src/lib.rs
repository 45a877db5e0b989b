//! # tally-store — Storage Backends
//!
//! The guard layer never talks to a database directly. It talks to a
//! [`Store`], an async trait with the read, write, bulk and aggregate
//! operations of a typical ORM client, all keyed by [`EntityKind`].
//!
//! ## Backends
//!
//! - [`MemoryStore`]: rows in a `parking_lot::RwLock`, filters evaluated by
//!   `Filter::matches`. Used in development and throughout the test suite.
//!
//! - [`PgStore`]: one JSONB `records` table in PostgreSQL. Filters compile
//!   to SQL with `sqlx::QueryBuilder`; field names are always bound, never
//!   interpolated.
//!
//! [`init_pool`] follows the usual startup rule: when `DATABASE_URL` is
//! unset the caller falls back to the in-memory backend.
//!
//! [`EntityKind`]: tally_core::EntityKind

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::{init_pool, PgStore};
pub use store::{SharedStore, Store};
