//! Core business logic - framework-agnostic bill arithmetic, billing periods,
//! history reports and encrypted settings.

/// Meter totals, per-unit cost and per-room billing
pub mod calculator;
/// Month names and the (month, year) billing period key
pub mod period;
/// Totals and formatting for history views
pub mod report;
/// Preparing the next month from the latest calculation
pub mod rollover;
/// Encrypted key/value settings
pub mod settings;
