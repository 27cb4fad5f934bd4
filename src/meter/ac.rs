//! # AC Meter Family
//!
//! Register model, metrics parsing and command constructors for the
//! single-phase AC module. A full metrics read returns ten input registers
//! (20-byte body); the options block is two holding registers (alarm
//! threshold and slave address).
//!
//! 32-bit quantities arrive with the low word first:
//! `value = first_reg | (second_reg << 16)`. This word order is what the
//! hardware ships and is reproduced bit-exact.

use crate::constants::*;
use crate::meter::frame::{self, RxFrame, TxFrame};
use crate::meter::{ErrKind, Measure};
use nom::number::complete::be_u16;
use nom::sequence::tuple;
use nom::IResult;
use std::time::{Duration, Instant};

const TAG: &str = "emeter::ac";

/// Raw metrics block of the AC module.
///
/// Values are kept in wire units; [`AcMetrics::as_float`] applies the fixed
/// divisors {10, 1000, 10, 1, 10, 100}.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AcMetrics {
    /// deci-volts
    pub voltage: u16,
    /// milli-amperes
    pub current: u32,
    /// deci-watts
    pub power: u32,
    /// watt-hours
    pub energy: u32,
    /// deci-hertz
    pub freq: u16,
    /// hundredths
    pub pf: u16,
    /// power alarm latch register, 0xFFFF when tripped
    pub alarm: u16,
}

fn registers10(input: &[u8]) -> IResult<&[u8], (u16, u16, u16, u16, u16, u16, u16, u16, u16, u16)> {
    tuple((
        be_u16, be_u16, be_u16, be_u16, be_u16, be_u16, be_u16, be_u16, be_u16, be_u16,
    ))(input)
}

fn registers2(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    tuple((be_u16, be_u16))(input)
}

impl AcMetrics {
    /// Tries to interpret `msg` as a full metrics reply and load it.
    ///
    /// Returns false when the function code or the declared body length does
    /// not match; the struct is left untouched in that case.
    pub fn parse(&mut self, msg: &RxFrame) -> bool {
        let raw = msg.raw();
        if msg.cmd() != CMD_RIR || raw.get(2).copied() != Some(AC_RIR_RESP_LEN) {
            return false;
        }
        let end = 3 + AC_RIR_RESP_LEN as usize;
        if raw.len() < end + 2 {
            return false;
        }
        let Ok((_, (v, cur_l, cur_h, pow_l, pow_h, en_l, en_h, freq, pf, alarm))) =
            registers10(&raw[3..end])
        else {
            return false;
        };
        log::trace!(target: TAG, "metrics reply from {}", msg.addr());

        self.voltage = v;
        self.current = u32::from(cur_l) | u32::from(cur_h) << 16;
        self.power = u32::from(pow_l) | u32::from(pow_h) << 16;
        self.energy = u32::from(en_l) | u32::from(en_h) << 16;
        self.freq = freq;
        self.pf = pf;
        self.alarm = alarm;
        true
    }

    /// True when the power alarm latch is set.
    pub fn alarm_latch(&self) -> bool {
        self.alarm != ALARM_ABSENT
    }

    /// Converts a measure to engineering units.
    pub fn as_float(&self, m: Measure) -> f32 {
        match m {
            Measure::Voltage => f32::from(self.voltage) / 10.0,
            Measure::Current => self.current as f32 / 1000.0,
            Measure::Power => self.power as f32 / 10.0,
            Measure::Energy => self.energy as f32,
            Measure::Frequency => f32::from(self.freq) / 10.0,
            Measure::PowerFactor => f32::from(self.pf) / 100.0,
            Measure::AlarmHigh => {
                if self.alarm_latch() {
                    1.0
                } else {
                    0.0
                }
            }
            Measure::AlarmLow => f32::NAN,
        }
    }
}

/// Full state of one AC meter: address, settings, error condition, metrics
/// and poll/update timestamps.
#[derive(Debug, Clone, Copy)]
pub struct AcState {
    /// Configured slave address
    pub addr: u8,
    /// Last recorded error condition
    pub err: ErrKind,
    /// When the last request was handed to the port
    pub last_poll: Option<Instant>,
    /// When the last reply was successfully applied
    pub last_update: Option<Instant>,
    /// Latest metrics block
    pub metrics: AcMetrics,
    /// Power alarm threshold, watts
    pub alarm_thr: u16,
}

impl AcState {
    pub fn new(addr: u8) -> Self {
        AcState {
            addr,
            err: ErrKind::Ok,
            last_poll: None,
            last_update: None,
            metrics: AcMetrics::default(),
            alarm_thr: 0,
        }
    }

    /// Time since the last successful update, or None before the first one.
    pub fn data_age(&self) -> Option<Duration> {
        self.last_update.map(|t| t.elapsed())
    }

    /// Data is stale once it is older than twice the meter refresh period.
    pub fn data_stale(&self) -> bool {
        match self.last_update {
            Some(t) => t.elapsed() > Duration::from_millis(2 * REFRESH_PERIOD_MS),
            None => true,
        }
    }

    /// Stamps the last-request time; called on every poll.
    pub fn mark_polled(&mut self) {
        self.last_poll = Some(Instant::now());
    }

    /// Applies a decoded reply to the state.
    ///
    /// Replies with a bad CRC or a foreign slave address are ignored.
    /// Device-reported errors store the error kind and leave the metrics in
    /// place. Returns true when the state was updated.
    pub fn apply(&mut self, msg: &RxFrame) -> bool {
        if !msg.valid || msg.addr() != self.addr {
            return false;
        }
        let raw = msg.raw();

        match msg.cmd() {
            CMD_RIR => {
                if !self.metrics.parse(msg) {
                    self.err = ErrKind::Parse;
                    return false;
                }
            }
            CMD_RHR => {
                // only the full two-register block is recognized
                if raw.get(2).copied() == Some((AC_RHR_COUNT * 2) as u8) && raw.len() >= 9 {
                    if let Ok((_, (thr, addr_reg))) = registers2(&raw[3..7]) {
                        self.alarm_thr = thr;
                        self.addr = (addr_reg & 0x00FF) as u8;
                    }
                }
            }
            CMD_WSR => {
                if raw.len() >= GENERIC_MSG_SIZE {
                    let reg = u16::from_be_bytes([raw[2], raw[3]]);
                    let value = u16::from_be_bytes([raw[4], raw[5]]);
                    match reg {
                        AC_RHR_ADDR => self.addr = (value & 0x00FF) as u8,
                        AC_RHR_ALARM_THR => self.alarm_thr = value,
                        _ => log::debug!(target: TAG, "write echo for unknown register {reg:#06x}"),
                    }
                }
            }
            CMD_RESET_ENERGY => self.metrics.energy = 0,
            cmd if cmd & CMD_ERR_BIT != 0 => {
                self.err = ErrKind::from_wire(raw.get(2).copied().unwrap_or(0));
                return true;
            }
            _ => {}
        }

        self.err = ErrKind::Ok;
        self.last_update = Some(Instant::now());
        true
    }
}

/// Request for the full metrics block.
pub fn cmd_get_metrics(addr: u8) -> TxFrame {
    frame::create_request(CMD_RIR, AC_RIR_BEGIN, AC_RIR_COUNT, addr, true)
}

/// Request for the full options block (alarm threshold and slave address).
///
/// Single-register reads are indistinguishable in the reply, so both
/// options are always read together.
pub fn cmd_get_opts(addr: u8) -> TxFrame {
    frame::create_request(CMD_RHR, AC_RHR_BEGIN, AC_RHR_COUNT, addr, true)
}

pub fn cmd_set_modbus_addr(new_addr: u8, current_addr: u8) -> TxFrame {
    super::cmd_set_modbus_addr(new_addr, current_addr)
}

pub fn cmd_get_modbus_addr(addr: u8) -> TxFrame {
    cmd_get_opts(addr)
}

pub fn cmd_get_alarm_thr(addr: u8) -> TxFrame {
    cmd_get_opts(addr)
}

/// Request to set the power alarm threshold in watts.
pub fn cmd_set_alarm_thr(watts: u16, addr: u8) -> TxFrame {
    frame::create_request(CMD_WSR, AC_RHR_ALARM_THR, watts, addr, true)
}

pub fn cmd_energy_reset(addr: u8) -> TxFrame {
    super::cmd_energy_reset(addr)
}
