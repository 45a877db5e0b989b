//! # Guard Errors
//!
//! Every rejection carries the structured data needed to build a user-facing
//! message, plus a stable machine code from [`GuardError::code`]. Rejections
//! are synchronous and never retried; the caller's transaction is expected
//! to abort.

use rust_decimal::Decimal;
use tally_core::{BusinessDate, CoreError, EntityKind};
use tally_store::StoreError;
use thiserror::Error;

pub type GuardResult<T> = Result<T, GuardError>;

#[derive(Error, Debug)]
pub enum GuardError {
    /// The write's effective date falls inside a closed or locked period.
    #[error("{entity} dated {effective_date} falls in a {period_status} accounting period")]
    PeriodLocked {
        entity: EntityKind,
        effective_date: BusinessDate,
        period_status: String,
    },

    /// The record is locked and the write touches fields outside its
    /// mutable set.
    #[error(
        "{entity} is immutable in its current state{}: cannot modify [{}]",
        .current_status.as_deref().map(|s| format!(" ({s})")).unwrap_or_default(),
        .fields.join(", ")
    )]
    ImmutabilityViolation {
        entity: EntityKind,
        fields: Vec<String>,
        current_status: Option<String>,
    },

    #[error(
        "illegal {entity} status transition {} -> {to}: {reason} (allowed: [{}])",
        .from.as_deref().unwrap_or("(new)"),
        .allowed_targets.join(", ")
    )]
    IllegalStatusTransition {
        entity: EntityKind,
        from: Option<String>,
        to: String,
        allowed_targets: Vec<String>,
        reason: String,
    },

    /// Status changes must go through the single-record path.
    #[error("bulk status changes are not allowed on {entity}")]
    BulkStatusChangeNotAllowed { entity: EntityKind },

    #[error("journal entry is unbalanced: debit {debit_total} != credit {credit_total}")]
    LedgerUnbalanced {
        debit_total: Decimal,
        credit_total: Decimal,
    },

    /// A journal line must have exactly one positive side and no negative side.
    #[error("journal line must have exactly one positive side (debit {debit}, credit {credit})")]
    LedgerLineInvalidAmount { debit: Decimal, credit: Decimal },

    #[error("journal entry {entry_id} has no lines and cannot be posted")]
    LedgerEntryHasNoLines { entry_id: String },

    #[error("cash day {business_date} is closed")]
    CashDayClosed { business_date: BusinessDate },

    #[error("cash balance would go negative: current {balance}, projected {projected}")]
    CashBalanceWouldGoNegative { balance: Decimal, projected: Decimal },

    #[error("{entity} amount must not be negative (got {amount})")]
    CashAmountNegative { entity: EntityKind, amount: Decimal },

    /// Cash records and day closes are single-record only.
    #[error("bulk mutation of {entity} is not allowed")]
    BulkCashMutationNotAllowed { entity: EntityKind },

    /// The targeted record does not exist or belongs to another tenant.
    #[error("{entity} record not found")]
    NotFound { entity: EntityKind },

    /// A value the guards need could not be interpreted.
    #[error("invalid value for {entity}.{field}: {detail}")]
    InvalidValue {
        entity: EntityKind,
        field: String,
        detail: String,
    },

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl GuardError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PeriodLocked { .. } => "PERIOD_LOCKED",
            Self::ImmutabilityViolation { .. } => "IMMUTABILITY_VIOLATION",
            Self::IllegalStatusTransition { .. } => "ILLEGAL_STATUS_TRANSITION",
            Self::BulkStatusChangeNotAllowed { .. } => "BULK_STATUS_CHANGE_NOT_ALLOWED",
            Self::LedgerUnbalanced { .. } => "LEDGER_UNBALANCED",
            Self::LedgerLineInvalidAmount { .. } => "LEDGER_LINE_INVALID_AMOUNT",
            Self::LedgerEntryHasNoLines { .. } => "LEDGER_ENTRY_HAS_NO_LINES",
            Self::CashDayClosed { .. } => "CASH_DAY_CLOSED",
            Self::CashBalanceWouldGoNegative { .. } => "CASH_BALANCE_WOULD_GO_NEGATIVE",
            Self::CashAmountNegative { .. } => "CASH_AMOUNT_NEGATIVE",
            Self::BulkCashMutationNotAllowed { .. } => "BULK_CASH_MUTATION_NOT_ALLOWED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidValue { .. } => "INVALID_VALUE",
            Self::Core(_) => "INVALID_INPUT",
            Self::Store(StoreError::NotFound { .. }) => "NOT_FOUND",
            Self::Store(StoreError::Conflict { .. }) => "CONFLICT",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Whether this is a business-rule rejection rather than an
    /// infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Core(_) | Self::Store(_))
    }

    pub(crate) fn invalid(entity: EntityKind, field: &str, detail: impl Into<String>) -> Self {
        Self::InvalidValue {
            entity,
            field: field.to_string(),
            detail: detail.into(),
        }
    }
}
