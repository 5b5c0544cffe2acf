//! Report generation for history views.
//!
//! Sums the per-room add-ons across calculations and formats money the way the
//! history tables show it. Framework-agnostic; the caller decides how to render.

use crate::models::{MainCalculationRecord, RoomRecord};

/// Summary columns written next to the first room of each CSV block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoomTotals {
    /// Sum of house rent over the rooms
    pub total_house_rent: f64,
    /// Sum of water bills over the rooms
    pub total_water_bill: f64,
    /// Sum of gas bills over the rooms
    pub total_gas_bill: f64,
    /// Sum of room electricity bills
    pub total_room_unit_bill: f64,
}

impl RoomTotals {
    /// Totals for one calculation's rooms.
    #[must_use]
    pub fn from_rooms(rooms: &[RoomRecord]) -> Self {
        rooms.iter().fold(Self::default(), |acc, room| Self {
            total_house_rent: acc.total_house_rent + room.house_rent,
            total_water_bill: acc.total_water_bill + room.water_bill,
            total_gas_bill: acc.total_gas_bill + room.gas_bill,
            total_room_unit_bill: acc.total_room_unit_bill + room.unit_bill,
        })
    }

    /// Adds another set of totals to this one.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        Self {
            total_house_rent: self.total_house_rent + other.total_house_rent,
            total_water_bill: self.total_water_bill + other.total_water_bill,
            total_gas_bill: self.total_gas_bill + other.total_gas_bill,
            total_room_unit_bill: self.total_room_unit_bill + other.total_room_unit_bill,
        }
    }

    /// Everything the tenants owe, electricity included.
    #[must_use]
    pub fn grand_total(&self) -> f64 {
        self.total_house_rent
            + self.total_water_bill
            + self.total_gas_bill
            + self.total_room_unit_bill
    }
}

/// Totals over every record in a history listing.
#[must_use]
pub fn summarize_history(records: &[MainCalculationRecord]) -> RoomTotals {
    records
        .iter()
        .map(|record| RoomTotals::from_rooms(&record.rooms))
        .fold(RoomTotals::default(), RoomTotals::combine)
}

/// Formats an amount as shown in the results panel, e.g. `"166.50 TK"`.
#[must_use]
pub fn format_taka(amount: f64) -> String {
    format!("{amount:.2} TK")
}

/// Renders a number without a trailing `.0` for whole values (`5000.0` -> `"5000"`).
#[must_use]
pub fn format_plain_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

/// One-line summary of a calculation for logs and notices.
#[must_use]
pub fn format_calculation_summary(record: &MainCalculationRecord) -> String {
    format!(
        "{} | units {} / diff {} | per unit {} | in total {} | {} room(s)",
        record.period,
        format_plain_number(record.total_unit),
        format_plain_number(record.total_diff),
        format_taka(record.per_unit_cost),
        format_taka(record.grand_total),
        record.rooms.len()
    )
}
