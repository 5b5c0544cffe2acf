//! "Add month" - preparing the next billing period from the latest calculation.
//!
//! The next period keeps the additional amount and each room's add-ons, clears the
//! meter and difference readings, and turns every room's present reading into the
//! new previous reading.

use crate::{
    core::{calculator::RoomCharges, period::BillingPeriod},
    models::MainCalculationRecord,
};

/// Room entry pre-filled for the next period. The present reading is left for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomDraft {
    /// Room name carried over
    pub room_name: String,
    /// Last period's present reading
    pub previous_reading: i64,
    /// Add-ons carried over unchanged
    pub charges: RoomCharges,
}

/// Inputs for a new period derived from the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct NextMonthDraft {
    /// The period being prepared
    pub period: BillingPeriod,
    /// Additional amount carried over
    pub additional_amount: f64,
    /// Rooms with their previous readings filled in
    pub rooms: Vec<RoomDraft>,
}

/// Finds the chronologically latest record. Ties keep the first one seen, which for
/// history listings is the most recently saved.
#[must_use]
pub fn latest_record(records: &[MainCalculationRecord]) -> Option<&MainCalculationRecord> {
    records.iter().fold(None, |best, record| match best {
        Some(current) if current.period >= record.period => Some(current),
        _ => Some(record),
    })
}

/// The chronologically latest period among `records`.
#[must_use]
pub fn latest_period(records: &[MainCalculationRecord]) -> Option<BillingPeriod> {
    latest_record(records).map(|record| record.period)
}

/// Builds the draft for the period after `record`.
#[must_use]
pub fn prepare_next_month(record: &MainCalculationRecord) -> NextMonthDraft {
    NextMonthDraft {
        period: record.period.next(),
        additional_amount: record.additional_amount,
        rooms: record
            .rooms
            .iter()
            .map(|room| RoomDraft {
                room_name: room.room_name.clone(),
                previous_reading: room.present_reading,
                charges: room.charges(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::period::Month;
    use crate::test_utils::sample_record;

    #[test]
    fn test_latest_record_orders_by_year_then_month() {
        let records = vec![
            sample_record(Month::November, 2024),
            sample_record(Month::February, 2025),
            sample_record(Month::December, 2024),
        ];
        let latest = latest_record(&records).unwrap();
        assert_eq!(latest.period.month, Month::February);
        assert_eq!(latest.period.year, 2025);
    }

    #[test]
    fn test_latest_record_empty() {
        assert!(latest_record(&[]).is_none());
        assert!(latest_period(&[]).is_none());
    }

    #[test]
    fn test_prepare_next_month_moves_present_to_previous() {
        let record = sample_record(Month::December, 2025);
        let draft = prepare_next_month(&record);

        assert_eq!(draft.period.month, Month::January);
        assert_eq!(draft.period.year, 2026);
        assert_eq!(draft.additional_amount, record.additional_amount);
        assert_eq!(draft.rooms.len(), record.rooms.len());
        for (draft_room, room) in draft.rooms.iter().zip(&record.rooms) {
            assert_eq!(draft_room.room_name, room.room_name);
            assert_eq!(draft_room.previous_reading, room.present_reading);
            assert_eq!(draft_room.charges.house_rent, room.house_rent);
        }
    }
}
