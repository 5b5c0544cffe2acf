//! User-visible notices.
//!
//! Errors are converted at the UI-action boundary: every failure becomes exactly
//! one [`Notice`] and is never propagated further.

use crate::{
    errors::{Error, ErrorKind},
    storage::{Backend, save::SaveReport},
};
use std::fmt;

/// How prominently a notice should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational, nothing went wrong
    Info,
    /// The user can correct the input and retry
    Warning,
    /// Something could not be persisted or reached
    Critical,
}

/// A titled message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// How prominently to show it
    pub severity: Severity,
    /// Short dialog title
    pub title: String,
    /// Full message
    pub message: String,
}

impl Notice {
    fn new(severity: Severity, title: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.to_string(),
            message: message.into(),
        }
    }

    /// Informational notice.
    pub fn info(title: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, title, message)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

fn title_for(error: &Error) -> &'static str {
    match error {
        Error::InvalidInput { .. } | Error::InvalidReading { .. } => "Invalid Input",
        Error::DivisionByZero => "Calculation Error",
        Error::NotFound { .. } => "Data Not Found",
        Error::FileLocked { .. } => "File Locked",
        Error::Http(_) => "Network Error",
        Error::RemoteApi { .. } => "Remote Store Error",
        Error::RemoteNotConfigured => "Remote Store Not Configured",
        Error::Database(_) => "Database Error",
        Error::Csv(_) | Error::Io(_) => "File Error",
        Error::Json(_) => "Data Error",
        Error::Busy => "Please Wait",
        Error::Config { .. } => "Configuration Error",
        Error::Crypto { .. } => "Settings Error",
    }
}

impl From<&Error> for Notice {
    fn from(error: &Error) -> Self {
        let severity = match error.kind() {
            ErrorKind::NotFound => Severity::Info,
            ErrorKind::InvalidInput | ErrorKind::DivisionByZero => Severity::Warning,
            ErrorKind::Persistence | ErrorKind::Internal => Severity::Critical,
        };
        let message = match error {
            Error::FileLocked { path } => format!(
                "Could not write {}. Close it in any other program and try again.",
                path.display()
            ),
            Error::Http(_) => format!("Could not reach the remote store: {error}"),
            Error::Busy => "A fetch is already running. Please wait for it to finish.".to_string(),
            _ => error.to_string(),
        };
        Self::new(severity, title_for(error), message)
    }
}

impl From<Error> for Notice {
    fn from(error: Error) -> Self {
        Self::from(&error)
    }
}

impl From<&SaveReport> for Notice {
    fn from(report: &SaveReport) -> Self {
        let saved: Vec<String> = report.succeeded().map(|b| b.to_string()).collect();
        let failed: Vec<String> = report
            .failed()
            .map(|(backend, e)| format!("{backend}: {e}"))
            .collect();

        if report.all_succeeded() {
            return Self::new(
                Severity::Info,
                "Saved",
                format!("{} saved to {}.", report.period, saved.join(" and ")),
            );
        }

        let mut message = String::new();
        if !saved.is_empty() {
            message.push_str(&format!(
                "{} saved to {}.\n",
                report.period,
                saved.join(" and ")
            ));
        }
        message.push_str("Failed:\n");
        message.push_str(&failed.join("\n"));

        if report.all_failed() {
            let title = match report.failed().next() {
                Some((Backend::Csv, Error::FileLocked { .. })) => "File Locked",
                _ => "Save Failed",
            };
            Self::new(Severity::Critical, title, message)
        } else {
            Self::new(Severity::Warning, "Partially Saved", message)
        }
    }
}
