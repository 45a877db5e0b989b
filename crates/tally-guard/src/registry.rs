//! # Period Entity Registry
//!
//! Which entities the period lock guard covers, where each one's effective
//! date comes from, and which operations are checked.
//!
//! | Entity                 | Date source                                  |
//! |------------------------|----------------------------------------------|
//! | Invoice                | `issue_date`                                 |
//! | InvoiceLine            | `invoice_id` → Invoice.`issue_date`          |
//! | Expense                | `expense_date`                               |
//! | BankTransaction        | `transaction_date`                           |
//! | JournalEntry           | `entry_date`                                 |
//! | JournalLine            | `journal_entry_id` → JournalEntry.`entry_date` |
//! | Payout                 | `payout_date`                                |
//! | PayoutLine             | `payout_id` → Payout.`payout_date`           |
//! | PayrollSubmission      | `period_end`                                 |
//! | PayrollSubmissionLine  | `payroll_submission_id` → PayrollSubmission.`period_end` |
//! | Asset                  | `acquisition_date` (create, update)          |
//! | CashIn / CashOut       | `business_date`                              |
//! | CashDayClose           | `business_date` (create)                     |

use tally_core::EntityKind;

use crate::guard::Operation;

/// Where an entity's effective date lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    /// A date column on the entity itself.
    Direct { field: &'static str },
    /// A date column on a parent row, reached through a foreign key.
    Derived {
        foreign_key: &'static str,
        parent: EntityKind,
        parent_field: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRegistration {
    pub entity: EntityKind,
    pub date_source: DateSource,
    pub check_on_create: bool,
    pub check_on_update: bool,
    pub check_on_delete: bool,
}

impl EntityRegistration {
    const fn direct(entity: EntityKind, field: &'static str) -> Self {
        Self {
            entity,
            date_source: DateSource::Direct { field },
            check_on_create: true,
            check_on_update: true,
            check_on_delete: true,
        }
    }

    const fn derived(
        entity: EntityKind,
        foreign_key: &'static str,
        parent: EntityKind,
        parent_field: &'static str,
    ) -> Self {
        Self {
            entity,
            date_source: DateSource::Derived {
                foreign_key,
                parent,
                parent_field,
            },
            check_on_create: true,
            check_on_update: true,
            check_on_delete: true,
        }
    }

    const fn only(mut self, create: bool, update: bool, delete: bool) -> Self {
        self.check_on_create = create;
        self.check_on_update = update;
        self.check_on_delete = delete;
        self
    }

    pub fn checks(&self, operation: Operation) -> bool {
        match operation {
            Operation::Create => self.check_on_create,
            Operation::Update => self.check_on_update,
            Operation::Delete => self.check_on_delete,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.date_source, DateSource::Direct { .. })
    }
}

pub static PERIOD_REGISTRY: &[EntityRegistration] = &[
    EntityRegistration::direct(EntityKind::Invoice, "issue_date"),
    EntityRegistration::derived(
        EntityKind::InvoiceLine,
        "invoice_id",
        EntityKind::Invoice,
        "issue_date",
    ),
    EntityRegistration::direct(EntityKind::Expense, "expense_date"),
    EntityRegistration::direct(EntityKind::BankTransaction, "transaction_date"),
    EntityRegistration::direct(EntityKind::JournalEntry, "entry_date"),
    EntityRegistration::derived(
        EntityKind::JournalLine,
        "journal_entry_id",
        EntityKind::JournalEntry,
        "entry_date",
    ),
    EntityRegistration::direct(EntityKind::Payout, "payout_date"),
    EntityRegistration::derived(
        EntityKind::PayoutLine,
        "payout_id",
        EntityKind::Payout,
        "payout_date",
    ),
    EntityRegistration::direct(EntityKind::PayrollSubmission, "period_end"),
    EntityRegistration::derived(
        EntityKind::PayrollSubmissionLine,
        "payroll_submission_id",
        EntityKind::PayrollSubmission,
        "period_end",
    ),
    EntityRegistration::direct(EntityKind::Asset, "acquisition_date").only(true, true, false),
    EntityRegistration::direct(EntityKind::CashIn, "business_date"),
    EntityRegistration::direct(EntityKind::CashOut, "business_date"),
    EntityRegistration::direct(EntityKind::CashDayClose, "business_date").only(true, false, false),
];

/// The registration for an entity, if it is period-guarded.
pub fn registration(entity: EntityKind) -> Option<&'static EntityRegistration> {
    PERIOD_REGISTRY.iter().find(|r| r.entity == entity)
}
