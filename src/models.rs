//! Domain records shared by every storage backend.
//!
//! Records are only built through validating constructors, so a stored calculation
//! always satisfies the calculator's invariants.

use crate::core::calculator::{self, RoomCharges, RoundingPolicy};
use crate::core::period::{BillingPeriod, Month};
use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw per-room entry as typed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInput {
    /// Display name of the room (e.g. "Room 1")
    pub room_name: String,
    /// Present meter reading
    pub present_reading: i64,
    /// Previous meter reading
    pub previous_reading: i64,
    /// Gas, water and rent add-ons
    #[serde(flatten)]
    pub charges: RoomCharges,
}

/// One room's billed consumption, owned by a [`MainCalculationRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    /// Display name of the room
    pub room_name: String,
    /// Present meter reading
    pub present_reading: i64,
    /// Previous meter reading
    pub previous_reading: i64,
    /// `present_reading - previous_reading`
    pub real_unit: i64,
    /// Electricity charge for the room
    pub unit_bill: f64,
    /// Gas bill
    pub gas_bill: f64,
    /// Water bill
    pub water_bill: f64,
    /// House rent
    pub house_rent: f64,
    /// Sum of the unit bill and the three add-ons
    pub grand_total: f64,
}

impl RoomRecord {
    /// Bills a room at the given per-unit cost.
    pub fn compute(input: &RoomInput, per_unit_cost: f64, policy: RoundingPolicy) -> Result<Self> {
        let name = input.room_name.trim();
        if name.is_empty() {
            return Err(Error::invalid_input("Room name cannot be empty"));
        }
        let bill = calculator::calculate_room_bill(
            name,
            input.present_reading,
            input.previous_reading,
            per_unit_cost,
            input.charges,
            policy,
        )?;
        Ok(Self {
            room_name: name.to_string(),
            present_reading: input.present_reading,
            previous_reading: input.previous_reading,
            real_unit: bill.real_unit,
            unit_bill: bill.unit_bill,
            gas_bill: input.charges.gas_bill,
            water_bill: input.charges.water_bill,
            house_rent: input.charges.house_rent,
            grand_total: bill.grand_total,
        })
    }

    /// The add-on charges of this room.
    #[must_use]
    pub const fn charges(&self) -> RoomCharges {
        RoomCharges {
            gas_bill: self.gas_bill,
            water_bill: self.water_bill,
            house_rent: self.house_rent,
        }
    }
}

/// A month's calculation together with its rooms. Keyed by [`BillingPeriod`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainCalculationRecord {
    /// Month and year of the bill
    pub period: BillingPeriod,
    /// One reading per physical meter
    pub meter_readings: Vec<i64>,
    /// Difference readings
    pub diff_readings: Vec<i64>,
    /// Flat amount added on top of the metered units
    pub additional_amount: f64,
    /// Sum of meter readings
    pub total_unit: f64,
    /// Sum of difference readings
    pub total_diff: f64,
    /// `total_unit / total_diff`
    pub per_unit_cost: f64,
    /// `total_unit + additional_amount`
    pub grand_total: f64,
    /// Per-room billing
    #[serde(default)]
    pub rooms: Vec<RoomRecord>,
}

impl MainCalculationRecord {
    /// Runs the calculator over the inputs and builds a validated record.
    ///
    /// Fails with [`Error::DivisionByZero`] when the difference readings sum to zero and
    /// with an invalid-input error for any bad reading, before anything is persisted.
    pub fn compute(
        period: BillingPeriod,
        meter_readings: Vec<i64>,
        diff_readings: Vec<i64>,
        additional_amount: f64,
        rooms: &[RoomInput],
        policy: RoundingPolicy,
    ) -> Result<Self> {
        let totals =
            calculator::calculate_totals(&meter_readings, &diff_readings, additional_amount)?;
        let rooms = rooms
            .iter()
            .map(|room| RoomRecord::compute(room, totals.per_unit_cost, policy))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            period,
            meter_readings,
            diff_readings,
            additional_amount,
            total_unit: totals.total_unit,
            total_diff: totals.total_diff,
            per_unit_cost: totals.per_unit_cost,
            grand_total: totals.grand_total,
            rooms,
        })
    }

    /// Month of the record.
    #[must_use]
    pub const fn month(&self) -> Month {
        self.period.month
    }

    /// Year of the record.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.period.year
    }
}

/// Identifier assigned by the backend a record was saved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordId(pub i64);

/// Document slots attached to a tenant record. Each holds a local path or a URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalDocuments {
    /// Tenant photo
    pub photo: Option<String>,
    /// Front of the national ID card
    pub nid_front: Option<String>,
    /// Back of the national ID card
    pub nid_back: Option<String>,
    /// Police verification form
    pub police_form: Option<String>,
}

impl RentalDocuments {
    /// Slot names paired with their values, in display order.
    #[must_use]
    pub fn slots(&self) -> [(&'static str, Option<&str>); 4] {
        [
            ("photo", self.photo.as_deref()),
            ("nid_front", self.nid_front.as_deref()),
            ("nid_back", self.nid_back.as_deref()),
            ("police_form", self.police_form.as_deref()),
        ]
    }
}

/// Fields a user fills in for a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalDraft {
    /// Tenant's name
    pub tenant_name: String,
    /// Room the tenant rents
    pub room_number: String,
    /// Advance payment received
    pub advanced_paid: f64,
    /// Attached document images
    #[serde(default)]
    pub documents: RentalDocuments,
}

impl RentalDraft {
    /// Checks required fields and trims names.
    pub fn validated(self) -> Result<Self> {
        let tenant_name = self.tenant_name.trim().to_string();
        let room_number = self.room_number.trim().to_string();
        if tenant_name.is_empty() {
            return Err(Error::invalid_input("Tenant name cannot be empty"));
        }
        if room_number.is_empty() {
            return Err(Error::invalid_input("Room number cannot be empty"));
        }
        if !self.advanced_paid.is_finite() || self.advanced_paid < 0.0 {
            return Err(Error::invalid_input(format!(
                "Advanced paid must be a non-negative number: {}",
                self.advanced_paid
            )));
        }
        Ok(Self {
            tenant_name,
            room_number,
            ..self
        })
    }
}

/// A tenant record. Archiving is a soft delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalRecord {
    /// Backend-local identifier
    pub id: i64,
    /// Correlation id shared between the local and remote stores
    pub remote_id: Option<String>,
    /// Tenant's name
    pub tenant_name: String,
    /// Room the tenant rents
    pub room_number: String,
    /// Advance payment received
    pub advanced_paid: f64,
    /// Attached document images
    pub documents: RentalDocuments,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record was last modified
    pub updated_at: DateTime<Utc>,
    /// Soft delete flag
    pub is_archived: bool,
}

/// Optional month/year filter for history queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Only records for this month
    pub month: Option<Month>,
    /// Only records for this year
    pub year: Option<i32>,
}

impl HistoryFilter {
    /// Whether a period passes the filter.
    #[must_use]
    pub fn matches(&self, period: &BillingPeriod) -> bool {
        self.month.is_none_or(|m| m == period.month) && self.year.is_none_or(|y| y == period.year)
    }
}

/// Offset pagination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Index of the first item
    pub offset: u64,
    /// Maximum number of items
    pub limit: u64,
}

impl PageRequest {
    /// First page of the given size.
    #[must_use]
    pub const fn first(limit: u64) -> Self {
        Self { offset: 0, limit }
    }

    /// The page after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }

    /// Slices an already ordered list into this page.
    #[must_use]
    pub fn slice<T>(self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let start = usize::try_from(self.offset).unwrap_or(usize::MAX).min(total);
        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);
        let items: Vec<T> = items.into_iter().skip(start).take(limit).collect();
        let has_more = start + items.len() < total;
        Page {
            items,
            request: self,
            has_more,
        }
    }
}

/// One page of results plus whether another page exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page, most recent first
    pub items: Vec<T>,
    /// The request that produced this page
    pub request: PageRequest,
    /// Whether a following page has items
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Request for the following page, if any.
    #[must_use]
    pub const fn next_request(&self) -> Option<PageRequest> {
        if self.has_more {
            Some(self.request.next())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    fn june_2025() -> BillingPeriod {
        BillingPeriod::new(Month::June, 2025).unwrap()
    }

    #[test]
    fn test_compute_reference_record() {
        let rooms = vec![RoomInput {
            room_name: " Room 1 ".to_string(),
            present_reading: 120,
            previous_reading: 70,
            charges: RoomCharges::default(),
        }];
        let record = MainCalculationRecord::compute(
            june_2025(),
            vec![100, 200, 300],
            vec![50, 60, 70],
            0.0,
            &rooms,
            RoundingPolicy::default(),
        )
        .unwrap();

        assert_eq!(record.total_unit, 600.0);
        assert_eq!(record.total_diff, 180.0);
        assert_eq!(record.rooms.len(), 1);
        assert_eq!(record.rooms[0].room_name, "Room 1");
        assert_eq!(record.rooms[0].real_unit, 50);
        assert!((record.rooms[0].unit_bill - 166.5).abs() < 1e-9);
    }

    #[test]
    fn test_compute_fails_before_rooms_on_zero_diff() {
        let err = MainCalculationRecord::compute(
            june_2025(),
            vec![100, 200, 300],
            vec![0, 0, 0],
            0.0,
            &[],
            RoundingPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DivisionByZero));
    }

    #[test]
    fn test_compute_rejects_blank_room_name() {
        let rooms = vec![RoomInput {
            room_name: "  ".to_string(),
            present_reading: 1,
            previous_reading: 0,
            charges: RoomCharges::default(),
        }];
        let err = MainCalculationRecord::compute(
            june_2025(),
            vec![1],
            vec![1],
            0.0,
            &rooms,
            RoundingPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }

    #[test]
    fn test_rental_draft_validation() {
        let draft = RentalDraft {
            tenant_name: "  Rahim ".to_string(),
            room_number: "2B".to_string(),
            advanced_paid: 5000.0,
            documents: RentalDocuments::default(),
        };
        assert_eq!(draft.validated().unwrap().tenant_name, "Rahim");

        let draft = RentalDraft {
            tenant_name: String::new(),
            room_number: "2B".to_string(),
            advanced_paid: 0.0,
            documents: RentalDocuments::default(),
        };
        assert!(draft.validated().is_err());

        let draft = RentalDraft {
            tenant_name: "Karim".to_string(),
            room_number: "2B".to_string(),
            advanced_paid: -1.0,
            documents: RentalDocuments::default(),
        };
        assert!(draft.validated().is_err());
    }

    #[test]
    fn test_history_filter_matches() {
        let period = june_2025();
        assert!(HistoryFilter::default().matches(&period));
        assert!(
            HistoryFilter {
                month: Some(Month::June),
                year: None
            }
            .matches(&period)
        );
        assert!(
            !HistoryFilter {
                month: Some(Month::June),
                year: Some(2024)
            }
            .matches(&period)
        );
    }

    #[test]
    fn test_page_slice_reports_more() {
        let page = PageRequest::first(2).slice(vec![1, 2, 3, 4, 5]);
        assert_eq!(page.items, vec![1, 2]);
        assert!(page.has_more);

        let last = page.next_request().unwrap().next().slice(vec![1, 2, 3, 4, 5]);
        assert_eq!(last.items, vec![5]);
        assert!(!last.has_more);
        assert!(last.next_request().is_none());

        let beyond = PageRequest { offset: 10, limit: 2 }.slice(vec![1, 2]);
        assert!(beyond.items.is_empty());
        assert!(!beyond.has_more);
    }
}
