//! Error types shared by the sensor drivers

use thiserror_no_std::Error;

/// Failure of a single sensor operation.
///
/// Drivers use this internally and log it; the public read operations turn it
/// into an "invalid reading" sentinel so a dead sensor never stops the rest of
/// the system.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: bus error during {operation}")]
    Bus {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: timed out during {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: protocol violation during {operation}: {details}")]
    Protocol {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: {operation} is not valid in the current state")]
    InvalidState {
        sensor: &'static str,
        operation: &'static str,
    },
}
