//! # Error Handling
//!
//! This module defines the MeterBusError enum covering the conditions that
//! propagate to API callers. Request-local failures (CRC mismatch, short or
//! malformed replies, device-reported Modbus errors) never surface here;
//! they are recorded on the owning meter's state and observable through
//! `get_state().err`.

use thiserror::Error;

/// Represents the error conditions raised by the crate API.
#[derive(Debug, Error)]
pub enum MeterBusError {
    /// Indicates a serial port open or configuration failure.
    #[error("Serial port error: {0}")]
    SerialPort(String),

    /// Indicates that the port worker pair is already running.
    #[error("Port workers already running")]
    AlreadyRunning,
}
