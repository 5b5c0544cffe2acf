//! Shared test utilities for `HomeUnitCalc`.
//!
//! This module provides common helper functions for setting up test databases
//! and building records with sensible defaults.

use crate::{
    core::{
        calculator::{RoomCharges, RoundingPolicy},
        period::{BillingPeriod, Month},
    },
    errors::Result,
    models::{MainCalculationRecord, RentalDocuments, RentalDraft, RoomInput},
};
use sea_orm::DatabaseConnection;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Routes `tracing` output through the test harness so it shows for failing tests.
/// Safe to call from every test; only the first call installs the subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .try_init();
}

/// Builds a computed calculation for the given month.
///
/// # Defaults
/// * meters `[100, 200, 300]`, diffs `[50, 60, 70]` (rate 3.33 after rounding)
/// * no additional amount
/// * "Room 1": 120 - 70, gas 500, water 200, rent 4000
/// * "Room 2": 100 - 70, gas 500, water 200, rent 5000
#[allow(clippy::unwrap_used)]
pub fn sample_record(month: Month, year: i32) -> MainCalculationRecord {
    let rooms = [
        room("Room 1", 120, 70, 4000.0),
        room("Room 2", 100, 70, 5000.0),
    ];
    MainCalculationRecord::compute(
        BillingPeriod::new(month, year).unwrap(),
        vec![100, 200, 300],
        vec![50, 60, 70],
        0.0,
        &rooms,
        RoundingPolicy::default(),
    )
    .unwrap()
}

fn room(name: &str, present: i64, previous: i64, house_rent: f64) -> RoomInput {
    RoomInput {
        room_name: name.to_string(),
        present_reading: present,
        previous_reading: previous,
        charges: RoomCharges {
            gas_bill: 500.0,
            water_bill: 200.0,
            house_rent,
        },
    }
}

/// Tenant draft with an advance of 5000 and no documents.
pub fn sample_draft(tenant_name: &str, room_number: &str) -> RentalDraft {
    RentalDraft {
        tenant_name: tenant_name.to_string(),
        room_number: room_number.to_string(),
        advanced_paid: 5000.0,
        documents: RentalDocuments::default(),
    }
}
