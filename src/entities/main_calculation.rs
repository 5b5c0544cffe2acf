//! Main calculation entity - one row per billing period.
//!
//! Meter and difference readings are stored as JSON arrays so any number of meters
//! fits one row. `(month, year)` is unique; see `config::database::create_tables`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Main calculation database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "main_calculations")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// English month name (e.g. "June")
    pub month: String,
    /// Calendar year
    pub year: i32,
    /// Meter readings as a JSON array of integers
    pub meter_readings: Json,
    /// Difference readings as a JSON array of integers
    pub diff_readings: Json,
    /// Flat additional amount
    pub additional_amount: f64,
    /// Sum of meter readings
    pub total_unit: f64,
    /// Sum of difference readings
    pub total_diff: f64,
    /// Total units per difference unit
    pub per_unit_cost: f64,
    /// Total units plus the additional amount
    pub grand_total: f64,
    /// When the period was first saved
    pub created_at: DateTimeUtc,
    /// When the period was last saved
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `MainCalculation` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One calculation has many rooms
    #[sea_orm(has_many = "super::room_calculation::Entity")]
    Rooms,
}

impl Related<super::room_calculation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rooms.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
