//! Entity module - Contains all SeaORM entity definitions for the local database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod app_config;
pub mod main_calculation;
pub mod rental;
pub mod room_calculation;

// Re-export specific types to avoid conflicts
pub use app_config::{Column as AppConfigColumn, Entity as AppConfig, Model as AppConfigModel};
pub use main_calculation::{
    Column as MainCalculationColumn, Entity as MainCalculation, Model as MainCalculationModel,
};
pub use rental::{Column as RentalColumn, Entity as Rental, Model as RentalModel};
pub use room_calculation::{
    Column as RoomCalculationColumn, Entity as RoomCalculation, Model as RoomCalculationModel,
};
