//! # Entity Catalog — Single Source of Truth
//!
//! `EntityKind` enumerates every table the guard layer reasons about. It
//! replaces dispatch on model-name strings: registries for period locking,
//! immutability, workflows and audit all key on this enum, and every
//! `match` on it is exhaustive.
//!
//! The three static classifications that live here are the ones every
//! layer needs: the table name the store uses, whether rows are owned by a
//! tenant, and whether writes are audited.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CoreError;

/// Every entity known to the store and guard layers.
///
/// | Area      | Entities |
/// |-----------|----------|
/// | Invoicing | Invoice, InvoiceLine |
/// | Expenses  | Expense |
/// | Banking   | BankTransaction |
/// | Ledger    | JournalEntry, JournalLine, AccountingPeriod |
/// | Payouts   | Payout, PayoutLine |
/// | Payroll   | PayrollSubmission, PayrollSubmissionLine, CalculationSnapshot |
/// | Documents | Evidence |
/// | Assets    | Asset, InventoryItem |
/// | Cash      | CashIn, CashOut, CashDayClose |
/// | Global    | RegulatoryRule |
/// | Internal  | AuditLog, OperationalEvent |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Invoice,
    InvoiceLine,
    Expense,
    BankTransaction,
    JournalEntry,
    JournalLine,
    AccountingPeriod,
    Payout,
    PayoutLine,
    PayrollSubmission,
    PayrollSubmissionLine,
    CalculationSnapshot,
    Evidence,
    Asset,
    InventoryItem,
    CashIn,
    CashOut,
    CashDayClose,
    RegulatoryRule,
    AuditLog,
    OperationalEvent,
}

impl EntityKind {
    /// Every entity in catalog order.
    pub fn all() -> &'static [EntityKind] {
        &[
            Self::Invoice,
            Self::InvoiceLine,
            Self::Expense,
            Self::BankTransaction,
            Self::JournalEntry,
            Self::JournalLine,
            Self::AccountingPeriod,
            Self::Payout,
            Self::PayoutLine,
            Self::PayrollSubmission,
            Self::PayrollSubmissionLine,
            Self::CalculationSnapshot,
            Self::Evidence,
            Self::Asset,
            Self::InventoryItem,
            Self::CashIn,
            Self::CashOut,
            Self::CashDayClose,
            Self::RegulatoryRule,
            Self::AuditLog,
            Self::OperationalEvent,
        ]
    }

    /// The entity name as it appears in audit records and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "Invoice",
            Self::InvoiceLine => "InvoiceLine",
            Self::Expense => "Expense",
            Self::BankTransaction => "BankTransaction",
            Self::JournalEntry => "JournalEntry",
            Self::JournalLine => "JournalLine",
            Self::AccountingPeriod => "AccountingPeriod",
            Self::Payout => "Payout",
            Self::PayoutLine => "PayoutLine",
            Self::PayrollSubmission => "PayrollSubmission",
            Self::PayrollSubmissionLine => "PayrollSubmissionLine",
            Self::CalculationSnapshot => "CalculationSnapshot",
            Self::Evidence => "Evidence",
            Self::Asset => "Asset",
            Self::InventoryItem => "InventoryItem",
            Self::CashIn => "CashIn",
            Self::CashOut => "CashOut",
            Self::CashDayClose => "CashDayClose",
            Self::RegulatoryRule => "RegulatoryRule",
            Self::AuditLog => "AuditLog",
            Self::OperationalEvent => "OperationalEvent",
        }
    }

    /// The storage table for this entity.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Invoice => "invoices",
            Self::InvoiceLine => "invoice_lines",
            Self::Expense => "expenses",
            Self::BankTransaction => "bank_transactions",
            Self::JournalEntry => "journal_entries",
            Self::JournalLine => "journal_lines",
            Self::AccountingPeriod => "accounting_periods",
            Self::Payout => "payouts",
            Self::PayoutLine => "payout_lines",
            Self::PayrollSubmission => "payroll_submissions",
            Self::PayrollSubmissionLine => "payroll_submission_lines",
            Self::CalculationSnapshot => "calculation_snapshots",
            Self::Evidence => "evidence",
            Self::Asset => "assets",
            Self::InventoryItem => "inventory_items",
            Self::CashIn => "cash_in",
            Self::CashOut => "cash_out",
            Self::CashDayClose => "cash_day_closes",
            Self::RegulatoryRule => "regulatory_rules",
            Self::AuditLog => "audit_logs",
            Self::OperationalEvent => "operational_events",
        }
    }

    /// Whether rows are owned by a tenant and must be isolated.
    ///
    /// Regulatory rules are system-wide reference data shared by every
    /// tenant and are the only unscoped entity.
    pub fn is_tenant_scoped(&self) -> bool {
        !matches!(self, Self::RegulatoryRule)
    }

    /// Whether successful writes emit an audit record.
    ///
    /// The audit log itself and the operational event outbox are written by
    /// the side-effect worker and are never audited, which would recurse.
    pub fn is_audited(&self) -> bool {
        !matches!(self, Self::AuditLog | Self::OperationalEvent)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    /// Parse from either the entity name or the table name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|e| e.as_str() == s || e.table_name() == s)
            .ok_or_else(|| CoreError::UnknownEntity(s.to_string()))
    }
}
