//! Bill arithmetic - meter totals, per-unit cost and per-room billing.
//!
//! Everything here is a pure function over its inputs. Validation happens before any
//! arithmetic so a zero total difference or a backwards room reading can never produce
//! `inf`, `NaN` or a negative consumption.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};

/// Precision used when rounding money values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// Nearest whole currency unit
    Integer,
    /// Nearest hundredth
    #[default]
    Cents,
}

impl Precision {
    /// Rounds `value` half away from zero at this precision.
    #[must_use]
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Integer => value.round(),
            Self::Cents => (value * 100.0).round() / 100.0,
        }
    }
}

/// How room unit bills are rounded. Applied uniformly to every room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundingPolicy {
    /// Precision of each room's unit bill
    #[serde(default)]
    pub room_bill: Precision,
    /// Round the per-unit cost to cents before pricing rooms
    #[serde(default = "default_round_rate")]
    pub round_rate: bool,
}

const fn default_round_rate() -> bool {
    true
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        Self {
            room_bill: Precision::Cents,
            round_rate: true,
        }
    }
}

impl RoundingPolicy {
    /// The rate rooms are billed at for a given per-unit cost.
    #[must_use]
    pub fn billing_rate(self, per_unit_cost: f64) -> f64 {
        if self.round_rate {
            Precision::Cents.apply(per_unit_cost)
        } else {
            per_unit_cost
        }
    }
}

/// Aggregates of one month's meter and difference readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterTotals {
    /// Sum of all meter readings
    pub total_unit: f64,
    /// Sum of all difference readings
    pub total_diff: f64,
    /// `total_unit / total_diff`
    pub per_unit_cost: f64,
    /// `total_unit + additional_amount`
    pub grand_total: f64,
}

/// Billing result for one room.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomBill {
    /// Net consumption, `present - previous`
    pub real_unit: i64,
    /// Consumption priced at the billing rate, rounded per policy
    pub unit_bill: f64,
    /// Unit bill plus gas, water and rent
    pub grand_total: f64,
}

/// Flat add-ons charged to a room on top of its electricity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RoomCharges {
    /// Gas bill
    pub gas_bill: f64,
    /// Water bill
    pub water_bill: f64,
    /// House rent
    pub house_rent: f64,
}

/// Sums readings, rejecting negative values.
pub fn sum_readings(readings: &[i64], label: &str) -> Result<i64> {
    readings.iter().enumerate().try_fold(0_i64, |acc, (i, &value)| {
        if value < 0 {
            return Err(Error::invalid_input(format!(
                "{label}-{} cannot be negative: {value}",
                i + 1
            )));
        }
        acc.checked_add(value)
            .ok_or_else(|| Error::invalid_input(format!("{label} readings are too large")))
    })
}

/// Divides total units by total difference units.
///
/// # Errors
/// [`Error::DivisionByZero`] when `total_diff` is zero.
pub fn per_unit_cost(total_unit: f64, total_diff: f64) -> Result<f64> {
    if total_diff == 0.0 {
        return Err(Error::DivisionByZero);
    }
    Ok(total_unit / total_diff)
}

/// Computes the month-level totals from raw readings and the flat additional amount.
pub fn calculate_totals(
    meter_readings: &[i64],
    diff_readings: &[i64],
    additional_amount: f64,
) -> Result<MeterTotals> {
    validate_amount(additional_amount, "Additional amount")?;

    // Cast safety: reading sums are far below 2^53.
    #[allow(clippy::cast_precision_loss)]
    let total_unit = sum_readings(meter_readings, "Meter")? as f64;
    #[allow(clippy::cast_precision_loss)]
    let total_diff = sum_readings(diff_readings, "Diff")? as f64;

    let per_unit_cost = per_unit_cost(total_unit, total_diff)?;

    Ok(MeterTotals {
        total_unit,
        total_diff,
        per_unit_cost,
        grand_total: total_unit + additional_amount,
    })
}

/// Prices one room's consumption.
///
/// # Errors
/// [`Error::InvalidReading`] if either reading is negative or `present < previous`;
/// [`Error::InvalidInput`] if an add-on charge is negative or not finite.
pub fn calculate_room_bill(
    room: &str,
    present: i64,
    previous: i64,
    per_unit_cost: f64,
    charges: RoomCharges,
    policy: RoundingPolicy,
) -> Result<RoomBill> {
    if present < 0 || previous < 0 || present < previous {
        return Err(Error::InvalidReading {
            room: room.to_string(),
            present,
            previous,
        });
    }
    validate_amount(charges.gas_bill, "Gas Bill")?;
    validate_amount(charges.water_bill, "Water Bill")?;
    validate_amount(charges.house_rent, "House Rent")?;

    let real_unit = present - previous;
    #[allow(clippy::cast_precision_loss)]
    let unit_bill = policy
        .room_bill
        .apply(real_unit as f64 * policy.billing_rate(per_unit_cost));

    Ok(RoomBill {
        real_unit,
        unit_bill,
        grand_total: unit_bill + charges.gas_bill + charges.water_bill + charges.house_rent,
    })
}

fn validate_amount(value: f64, field: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::invalid_input(format!("{field} must be a number")));
    }
    if value < 0.0 {
        return Err(Error::invalid_input(format!(
            "{field} cannot be negative: {value}"
        )));
    }
    Ok(())
}

/// Parses a reading typed into a form. Empty text counts as zero and `"123.0"` is accepted.
pub fn parse_reading(text: &str, field: &str) -> Result<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    match trimmed.parse::<f64>() {
        // Cast safety: only whole, finite values in i64 range reach the cast.
        #[allow(clippy::cast_possible_truncation)]
        Ok(value) if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 => {
            Ok(value as i64)
        }
        _ => Err(Error::invalid_input(format!(
            "{field} must be a whole number: '{trimmed}'"
        ))),
    }
}

/// Parses a money amount typed into a form. Empty text counts as zero.
pub fn parse_amount(text: &str, field: &str) -> Result<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    let value = trimmed
        .parse::<f64>()
        .map_err(|_| Error::invalid_input(format!("{field} must be a number: '{trimmed}'")))?;
    validate_amount(value, field)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_totals_for_reference_month() {
        let totals = calculate_totals(&[100, 200, 300], &[50, 60, 70], 0.0).unwrap();
        assert_eq!(totals.total_unit, 600.0);
        assert_eq!(totals.total_diff, 180.0);
        assert!(approx(totals.per_unit_cost, 600.0 / 180.0));
        assert_eq!(Precision::Cents.apply(totals.per_unit_cost), 3.33);
        assert_eq!(totals.grand_total, 600.0);
    }

    #[test]
    fn test_grand_total_adds_additional_amount() {
        let totals = calculate_totals(&[10, 20], &[5], 150.5).unwrap();
        assert_eq!(totals.grand_total, 180.5);
        assert_eq!(totals.per_unit_cost, 6.0);
    }

    #[test]
    fn test_zero_total_diff_is_division_by_zero() {
        let err = calculate_totals(&[100, 200, 300], &[0, 0, 0], 0.0).unwrap_err();
        assert!(matches!(err, Error::DivisionByZero));

        let err = calculate_totals(&[1], &[], 0.0).unwrap_err();
        assert!(matches!(err, Error::DivisionByZero));
    }

    #[test]
    fn test_negative_meter_reading_is_invalid_input() {
        let err = calculate_totals(&[10, -1], &[5], 0.0).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[test]
    fn test_negative_additional_amount_is_invalid_input() {
        let err = calculate_totals(&[10], &[5], -3.0).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        let err = calculate_totals(&[10], &[5], f64::NAN).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[test]
    fn test_room_bill_reference_scenario() {
        let rate = 600.0 / 180.0;
        let bill = calculate_room_bill(
            "Room 1",
            120,
            70,
            rate,
            RoomCharges::default(),
            RoundingPolicy::default(),
        )
        .unwrap();
        assert_eq!(bill.real_unit, 50);
        assert!(approx(bill.unit_bill, 166.5));
        assert!(approx(bill.grand_total, 166.5));
    }

    #[test]
    fn test_room_bill_with_exact_rate_policies() {
        let rate = 600.0 / 180.0;
        let cents = RoundingPolicy {
            room_bill: Precision::Cents,
            round_rate: false,
        };
        let bill = calculate_room_bill("R", 120, 70, rate, RoomCharges::default(), cents).unwrap();
        assert!(approx(bill.unit_bill, 166.67));

        let whole = RoundingPolicy {
            room_bill: Precision::Integer,
            round_rate: false,
        };
        let bill = calculate_room_bill("R", 120, 70, rate, RoomCharges::default(), whole).unwrap();
        assert_eq!(bill.unit_bill, 167.0);
    }

    #[test]
    fn test_room_grand_total_adds_charges() {
        let charges = RoomCharges {
            gas_bill: 500.0,
            water_bill: 200.0,
            house_rent: 5000.0,
        };
        let bill =
            calculate_room_bill("Room 2", 30, 10, 5.0, charges, RoundingPolicy::default()).unwrap();
        assert_eq!(bill.real_unit, 20);
        assert_eq!(bill.unit_bill, 100.0);
        assert_eq!(bill.grand_total, 5800.0);
    }

    #[test]
    fn test_backwards_reading_is_rejected() {
        let err = calculate_room_bill(
            "Room 3",
            50,
            70,
            3.0,
            RoomCharges::default(),
            RoundingPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidReading {
                present: 50,
                previous: 70,
                ..
            }
        ));
    }

    #[test]
    fn test_negative_reading_is_rejected() {
        let err = calculate_room_bill(
            "Room 3",
            10,
            -1,
            3.0,
            RoomCharges::default(),
            RoundingPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidReading { .. }));
    }

    #[test]
    fn test_negative_charge_is_rejected() {
        let charges = RoomCharges {
            gas_bill: -1.0,
            ..RoomCharges::default()
        };
        let err = calculate_room_bill("R", 10, 0, 3.0, charges, RoundingPolicy::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[test]
    fn test_unit_bill_is_monotonic_in_consumption() {
        let rate = 7.0 / 3.0;
        for policy in [
            RoundingPolicy::default(),
            RoundingPolicy {
                room_bill: Precision::Integer,
                round_rate: false,
            },
        ] {
            let mut last = f64::MIN;
            for present in 0..200 {
                let bill =
                    calculate_room_bill("R", present, 0, rate, RoomCharges::default(), policy)
                        .unwrap();
                assert!(bill.unit_bill >= last);
                last = bill.unit_bill;
            }
        }
    }

    #[test]
    fn test_parse_reading_accepts_form_text() {
        assert_eq!(parse_reading("", "Meter-1").unwrap(), 0);
        assert_eq!(parse_reading(" 42 ", "Meter-1").unwrap(), 42);
        assert_eq!(parse_reading("123.0", "Meter-1").unwrap(), 123);
        assert!(parse_reading("12.5", "Meter-1").is_err());
        assert!(parse_reading("abc", "Meter-1").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("", "Gas Bill").unwrap(), 0.0);
        assert_eq!(parse_amount("12.5", "Gas Bill").unwrap(), 12.5);
        assert!(parse_amount("-4", "Gas Bill").is_err());
        assert!(parse_amount("twelve", "Gas Bill").is_err());
    }
}
