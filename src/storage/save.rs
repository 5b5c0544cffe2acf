//! Saving one calculation to several backends.
//!
//! The record is computed up front, so a calculation error persists nothing. Each
//! selected backend is then attempted once, in order, and its outcome recorded.

use crate::{
    core::{calculator::RoundingPolicy, period::BillingPeriod},
    errors::{Error, Result},
    models::{MainCalculationRecord, RecordId, RoomInput},
    storage::{Backend, CalculationStore},
};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Raw inputs of one month, before calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationInput {
    /// Month being billed
    pub period: BillingPeriod,
    /// Main meter readings
    pub meter_readings: Vec<i64>,
    /// Difference meter readings
    pub diff_readings: Vec<i64>,
    /// Extra amount added to the grand total
    pub additional_amount: f64,
    /// Per-room inputs
    pub rooms: Vec<RoomInput>,
}

impl CalculationInput {
    /// Runs the calculator over the inputs.
    pub fn compute(&self, policy: RoundingPolicy) -> Result<MainCalculationRecord> {
        MainCalculationRecord::compute(
            self.period,
            self.meter_readings.clone(),
            self.diff_readings.clone(),
            self.additional_amount,
            &self.rooms,
            policy,
        )
    }
}

/// Result of saving to one backend.
#[derive(Debug)]
pub struct SaveOutcome {
    /// Backend that was attempted
    pub backend: Backend,
    /// Assigned id, or why the save failed
    pub result: Result<RecordId>,
}

impl SaveOutcome {
    /// Whether this backend saved the record.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-backend outcomes of one multi-target save.
#[derive(Debug)]
pub struct SaveReport {
    /// Period that was saved
    pub period: BillingPeriod,
    /// One entry per attempted backend, in attempt order
    pub outcomes: Vec<SaveOutcome>,
}

impl SaveReport {
    /// Backends that saved the record.
    pub fn succeeded(&self) -> impl Iterator<Item = Backend> + '_ {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded())
            .map(|o| o.backend)
    }

    /// Backends that failed, with their errors.
    pub fn failed(&self) -> impl Iterator<Item = (Backend, &Error)> + '_ {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.backend, e)))
    }

    /// Every backend succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(SaveOutcome::succeeded)
    }

    /// At least one backend succeeded and at least one failed.
    #[must_use]
    pub fn partially_succeeded(&self) -> bool {
        self.outcomes.iter().any(SaveOutcome::succeeded) && !self.all_succeeded()
    }

    /// No backend succeeded.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        !self.outcomes.iter().any(SaveOutcome::succeeded)
    }
}

/// Saves an already computed record to each store in turn. No retries.
#[instrument(skip_all, fields(period = %record.period, targets = stores.len()))]
pub async fn save_to_all(
    stores: &[Arc<dyn CalculationStore>],
    record: &MainCalculationRecord,
) -> SaveReport {
    let mut outcomes = Vec::with_capacity(stores.len());
    for store in stores {
        let backend = store.backend();
        let result = store.save(record).await;
        if let Err(e) = &result {
            error!("Saving {} to {} failed: {}", record.period, backend, e);
        }
        outcomes.push(SaveOutcome { backend, result });
    }
    SaveReport {
        period: record.period,
        outcomes,
    }
}

/// Computes the record and saves it to every selected store.
///
/// Fails without touching any store when no store is selected or the calculation
/// itself fails.
pub async fn compute_and_save(
    input: &CalculationInput,
    policy: RoundingPolicy,
    stores: &[Arc<dyn CalculationStore>],
) -> Result<(MainCalculationRecord, SaveReport)> {
    if stores.is_empty() {
        return Err(Error::invalid_input("Select at least one place to save to"));
    }
    let record = input.compute(policy)?;
    let report = save_to_all(stores, &record).await;
    info!(
        "Saved {} to {} of {} backend(s)",
        record.period,
        report.succeeded().count(),
        report.outcomes.len()
    );
    Ok((record, report))
}
