//! Protocol constants for the supported meter families.
//!
//! Register maps, Modbus command codes, address ranges and frame/timing
//! parameters for the single-phase AC family and the DC family. All
//! registers are 16-bit; 32-bit quantities span two registers with the low
//! word transmitted first.

// ----------------------------------------------------------------------------
// Modbus command codes
// ----------------------------------------------------------------------------

/// Read Holding Registers (the RW options block)
pub const CMD_RHR: u8 = 0x03;
/// Read Input Registers (the RO metrics block)
pub const CMD_RIR: u8 = 0x04;
/// Write Single Register
pub const CMD_WSR: u8 = 0x06;
/// Factory calibration (restricted)
pub const CMD_CALIBRATE: u8 = 0x41;
/// Reset the energy counter
pub const CMD_RESET_ENERGY: u8 = 0x42;

/// Error reply to a Read Holding Registers request
pub const CMD_RHR_ERR: u8 = 0x83;
/// Error reply to a Read Input Registers request
pub const CMD_RIR_ERR: u8 = 0x84;
/// Error reply to a Write Single Register request
pub const CMD_WSR_ERR: u8 = 0x86;
/// Error reply to a calibration request
pub const CMD_CALIBRATE_ERR: u8 = 0xC1;
/// Error reply to an energy reset request
pub const CMD_RESET_ERR: u8 = 0xC2;

/// Error replies carry the request function code with this bit set
pub const CMD_ERR_BIT: u8 = 0x80;

// ----------------------------------------------------------------------------
// Slave addressing
// ----------------------------------------------------------------------------

/// Broadcast address, devices never answer here
pub const ADDR_BCAST: u8 = 0x00;
/// Lowest assignable slave address
pub const ADDR_MIN: u8 = 0x01;
/// Highest assignable slave address
pub const ADDR_MAX: u8 = 0xF7;
/// Catch-all address, honored by every device regardless of its own address
pub const ADDR_ANY: u8 = 0xF8;

// ----------------------------------------------------------------------------
// Device-reported error kinds (first body byte of an error reply)
// ----------------------------------------------------------------------------

pub const ERR_FUNC: u8 = 0x01;
pub const ERR_ADDR: u8 = 0x02;
pub const ERR_DATA: u8 = 0x03;
pub const ERR_SLAVE: u8 = 0x04;

// ----------------------------------------------------------------------------
// Factory calibration
// ----------------------------------------------------------------------------

/// Calibration is always issued on the catch-all address
pub const CAL_ADDR: u8 = ADDR_ANY;
/// Fixed calibration password
pub const CAL_PASSWORD: u16 = 0x3721;

// ----------------------------------------------------------------------------
// Alarm register values
// ----------------------------------------------------------------------------

pub const ALARM_PRESENT: u16 = 0xFFFF;
pub const ALARM_ABSENT: u16 = 0x0000;

// ----------------------------------------------------------------------------
// Frame sizes and timing
// ----------------------------------------------------------------------------

/// Read/write-single request frame length
pub const GENERIC_MSG_SIZE: usize = 8;
/// Energy reset request frame length
pub const ENERGY_RST_MSG_SIZE: usize = 4;
/// Calibration request frame length
pub const CAL_MSG_SIZE: usize = 6;

/// Wire speed for both families
pub const METER_BAUD_RATE: u32 = 9600;
/// Bounded wait for the ready-to-send token, ms
pub const PORT_TIMEOUT_MS: u64 = 100;
/// The meter refreshes its internal registers roughly once a second;
/// polling faster returns the same data
pub const REFRESH_PERIOD_MS: u64 = 1000;
/// Default auto-poll period, ms
pub const POLLER_PERIOD_MS: u64 = REFRESH_PERIOD_MS;
/// Lowest accepted auto-poll period: one full request/reply turnaround
pub const POLLER_MIN_PERIOD_MS: u64 = 2 * PORT_TIMEOUT_MS;
/// Outgoing request queue depth per port
pub const TX_QUEUE_DEPTH: usize = 8;

// ----------------------------------------------------------------------------
// AC family (single-phase 80-260 V module)
// ----------------------------------------------------------------------------

/// Input register: voltage, 1 LSB = 0.1 V
pub const AC_RIR_VOLTAGE: u16 = 0x0000;
/// Input register: current low word, 1 LSB = 0.001 A
pub const AC_RIR_CURRENT_L: u16 = 0x0001;
pub const AC_RIR_CURRENT_H: u16 = 0x0002;
/// Input register: power low word, 1 LSB = 0.1 W
pub const AC_RIR_POWER_L: u16 = 0x0003;
pub const AC_RIR_POWER_H: u16 = 0x0004;
/// Input register: energy low word, 1 LSB = 1 Wh
pub const AC_RIR_ENERGY_L: u16 = 0x0005;
pub const AC_RIR_ENERGY_H: u16 = 0x0006;
/// Input register: frequency, 1 LSB = 0.1 Hz
pub const AC_RIR_FREQUENCY: u16 = 0x0007;
/// Input register: power factor, 1 LSB = 0.01
pub const AC_RIR_PF: u16 = 0x0008;
/// Input register: power alarm latch, 0xFFFF when tripped
pub const AC_RIR_ALARM: u16 = 0x0009;

pub const AC_RIR_BEGIN: u16 = 0x0000;
pub const AC_RIR_COUNT: u16 = 0x000A;
/// Declared body length of a full AC metrics reply
pub const AC_RIR_RESP_LEN: u8 = 0x14;

/// Holding register: power alarm threshold, 1 LSB = 1 W
pub const AC_RHR_ALARM_THR: u16 = 0x0001;
/// Holding register: slave address, range 0x0001..=0x00F7
pub const AC_RHR_ADDR: u16 = 0x0002;
pub const AC_RHR_BEGIN: u16 = 0x0001;
pub const AC_RHR_COUNT: u16 = 2;

// ----------------------------------------------------------------------------
// DC family (shunt-based module)
// ----------------------------------------------------------------------------

/// Input register: voltage, 1 LSB = 0.01 V
pub const DC_RIR_VOLTAGE: u16 = 0x0000;
/// Input register: current, 1 LSB = 0.01 A
pub const DC_RIR_CURRENT: u16 = 0x0001;
/// Input register: power low word, 1 LSB = 0.1 W
pub const DC_RIR_POWER_L: u16 = 0x0002;
pub const DC_RIR_POWER_H: u16 = 0x0003;
/// Input register: energy low word, 1 LSB = 1 Wh
pub const DC_RIR_ENERGY_L: u16 = 0x0004;
pub const DC_RIR_ENERGY_H: u16 = 0x0005;
/// Input register: high-voltage alarm latch
pub const DC_RIR_ALARM_H: u16 = 0x0006;
/// Input register: low-voltage alarm latch
pub const DC_RIR_ALARM_L: u16 = 0x0007;

pub const DC_RIR_BEGIN: u16 = 0x0000;
pub const DC_RIR_COUNT: u16 = 0x0008;
/// Declared body length of a full DC metrics reply
pub const DC_RIR_RESP_LEN: u8 = 0x10;

/// Holding register: high alarm threshold
pub const DC_RHR_ALARM_H: u16 = 0x0000;
/// Holding register: low alarm threshold
pub const DC_RHR_ALARM_L: u16 = 0x0001;
/// Holding register: slave address
pub const DC_RHR_ADDR: u16 = 0x0002;
/// Holding register: shunt range selector, 0..=3
pub const DC_RHR_SHUNT: u16 = 0x0003;
pub const DC_RHR_BEGIN: u16 = 0x0000;
pub const DC_RHR_COUNT: u16 = 4;
