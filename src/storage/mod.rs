//! # Storage
//!
//! Interchangeable persistence backends for monthly calculations and tenant records.
//! Callers work against [`CalculationStore`] and [`RentalStore`]; the CSV history
//! file, the local `SQLite` database and the remote table store all implement the
//! calculation trait with the same upsert semantics keyed by [`BillingPeriod`].

use crate::{
    core::period::BillingPeriod,
    errors::Result,
    models::{
        HistoryFilter, MainCalculationRecord, Page, PageRequest, RecordId, RentalDraft,
        RentalRecord,
    },
};
use async_trait::async_trait;
use std::fmt;

/// CSV history file backend
pub mod csv;
/// Filtered, paginated history reads
pub mod history;
/// Local `SQLite` backend
pub mod local;
/// Remote REST table store backend
pub mod remote;
/// Saving one calculation to several backends
pub mod save;

/// Identifies a storage backend in logs and save reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// `meter_calculation_history.csv`
    Csv,
    /// Local `SQLite` database
    Local,
    /// Remote table store
    Remote,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "CSV history",
            Self::Local => "local database",
            Self::Remote => "remote store",
        })
    }
}

/// Storage of monthly calculations keyed by `(month, year)`.
///
/// Saving an existing period replaces its main fields and all of its rooms.
/// `load` and `delete` of an absent period fail with `NotFound`.
#[async_trait]
pub trait CalculationStore: Send + Sync {
    /// Which backend this is
    fn backend(&self) -> Backend;

    /// Upsert a calculation and replace its rooms
    async fn save(&self, record: &MainCalculationRecord) -> Result<RecordId>;

    /// Load the calculation for a period
    async fn load(&self, period: &BillingPeriod) -> Result<MainCalculationRecord>;

    /// Delete the calculation for a period together with its rooms
    async fn delete(&self, period: &BillingPeriod) -> Result<()>;

    /// List calculations matching `filter`, most recent first
    async fn list(
        &self,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<MainCalculationRecord>>;
}

/// Whether a listing should show active or archived tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveFilter {
    /// Only records that are not archived
    #[default]
    Active,
    /// Only archived records
    Archived,
    /// Everything
    All,
}

impl ArchiveFilter {
    /// The `is_archived` value to match, if any.
    #[must_use]
    pub const fn archived_flag(self) -> Option<bool> {
        match self {
            Self::Active => Some(false),
            Self::Archived => Some(true),
            Self::All => None,
        }
    }
}

/// Storage of tenant records. Archiving is a soft delete; `delete` removes the row.
#[async_trait]
pub trait RentalStore: Send + Sync {
    /// Which backend this is
    fn backend(&self) -> Backend;

    /// Create a tenant record
    async fn create(&self, draft: RentalDraft) -> Result<RentalRecord>;

    /// Replace the editable fields of a record
    async fn update(&self, id: i64, draft: RentalDraft) -> Result<RentalRecord>;

    /// Archive or restore a record
    async fn set_archived(&self, id: i64, archived: bool) -> Result<()>;

    /// Permanently remove a record
    async fn delete(&self, id: i64) -> Result<()>;

    /// Fetch one record
    async fn get(&self, id: i64) -> Result<RentalRecord>;

    /// List records, most recently updated first
    async fn list(&self, filter: ArchiveFilter, page: PageRequest) -> Result<Page<RentalRecord>>;
}
