//! # Meter Protocol Layer
//!
//! Frame codec, per-family register models and the meter device objects.

pub mod ac;
pub mod crc;
pub mod dc;
pub mod device;
pub mod frame;
pub mod sim;

use crate::constants::{
    ADDR_ANY, ADDR_MIN, CMD_WSR, ERR_ADDR, ERR_DATA, ERR_FUNC, ERR_SLAVE,
};
use crate::meter::frame::TxFrame;

const TAG: &str = "emeter::meter";

/// Supported meter families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterModel {
    /// Single-phase AC module
    Ac,
    /// DC shunt module
    Dc,
}

/// Electricity measures a metrics struct can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Voltage,
    Current,
    Power,
    Energy,
    Frequency,
    PowerFactor,
    AlarmHigh,
    AlarmLow,
}

/// Per-meter error condition, recorded on state and left in place until the
/// next successful update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrKind {
    /// No error
    #[default]
    Ok,
    /// Device reported an illegal function
    IllegalFunction,
    /// Device reported an illegal register address
    IllegalAddress,
    /// Device reported illegal data
    IllegalData,
    /// Device reported an internal slave error
    SlaveError,
    /// Reply did not match the expected layout
    Parse,
}

impl ErrKind {
    /// Maps the first body byte of an error reply.
    pub(crate) fn from_wire(code: u8) -> ErrKind {
        match code {
            ERR_FUNC => ErrKind::IllegalFunction,
            ERR_ADDR => ErrKind::IllegalAddress,
            ERR_DATA => ErrKind::IllegalData,
            ERR_SLAVE => ErrKind::SlaveError,
            _ => ErrKind::Parse,
        }
    }
}

/// Builds a request to change a device's slave address.
///
/// Both families keep the address in holding register 2. An out-of-range
/// `new_addr` silently falls back to `current_addr` to stay wire-compatible
/// with deployed firmware expecting that leniency.
pub fn cmd_set_modbus_addr(new_addr: u8, current_addr: u8) -> TxFrame {
    let mut addr = new_addr;
    if !(ADDR_MIN..=ADDR_ANY).contains(&addr) {
        log::warn!(
            target: TAG,
            "requested address {new_addr} out of range, keeping {current_addr}"
        );
        addr = current_addr;
    }
    frame::create_request(
        CMD_WSR,
        crate::constants::AC_RHR_ADDR,
        u16::from(addr),
        current_addr,
        true,
    )
}

/// Builds the energy counter reset request.
pub fn cmd_energy_reset(addr: u8) -> TxFrame {
    frame::energy_reset_request(addr)
}
