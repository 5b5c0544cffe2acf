//! Room calculation entity - per-room billing rows owned by a main calculation.
//! `position` keeps rooms in the order they were entered.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Room calculation database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "room_calculations")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning `main_calculations` row
    pub main_calculation_id: i64,
    /// Zero-based order within the calculation
    pub position: i32,
    /// Display name of the room
    pub room_name: String,
    /// Present meter reading
    pub present_reading: i64,
    /// Previous meter reading
    pub previous_reading: i64,
    /// Net consumption
    pub real_unit: i64,
    /// Electricity charge
    pub unit_bill: f64,
    /// Gas bill
    pub gas_bill: f64,
    /// Water bill
    pub water_bill: f64,
    /// House rent
    pub house_rent: f64,
    /// Unit bill plus add-ons
    pub grand_total: f64,
}

/// Defines relationships between `RoomCalculation` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each room belongs to one calculation
    #[sea_orm(
        belongs_to = "super::main_calculation::Entity",
        from = "Column::MainCalculationId",
        to = "super::main_calculation::Column::Id",
        on_delete = "Cascade"
    )]
    MainCalculation,
}

impl Related<super::main_calculation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MainCalculation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
