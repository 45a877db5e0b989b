//! # tally-core — Foundational Types for Tally
//!
//! The leaf crate of the workspace. Every other `tally-*` crate depends on
//! it; it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `TenantId`, `UserId` and
//!    `RecordId` are distinct types. A user id cannot be passed where a
//!    tenant id is expected.
//!
//! 2. **One entity catalog.** [`EntityKind`] enumerates every table the guard
//!    layer knows about. Registries key on the enum, never on table-name
//!    strings, so adding an entity forces every exhaustive `match` to handle it.
//!
//! 3. **Field updates are decided at the boundary.** A [`Payload`] is a map of
//!    [`FieldUpdate`] values. Whether a caller meant "set", "connect" or
//!    "increment" is resolved once in [`Payload::from_json`], not re-sniffed
//!    by every guard.
//!
//! 4. **No floats in money or checksums.** Amounts travel as decimal strings
//!    and are parsed with `rust_decimal`. `CanonicalBytes` rejects floats, so
//!    checksums are deterministic.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `tally-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod entity;
pub mod error;
pub mod filter;
pub mod identity;
pub mod payload;
pub mod record;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use digest::{sha256_hex, Checksum};
pub use entity::EntityKind;
pub use error::{CanonicalizationError, CoreError};
pub use filter::{Clause, Condition, Filter};
pub use identity::{new_record_id, RecordId, TenantId, UserId};
pub use payload::{FieldUpdate, Payload};
pub use record::{
    compare_values, decimal_from_value, decimal_to_value, numeric_value, values_equal, Record,
    RecordExt,
};
pub use temporal::{BusinessDate, Timestamp};
