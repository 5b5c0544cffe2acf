/// Application settings from config.toml and environment overrides
pub mod app;

/// Database configuration and connection management
pub mod database;

/// Encryption key resolution for the settings table
pub mod secrets;

pub use app::{AppConfig, CsvConfig, CsvWriteMode, load_app_configuration};
