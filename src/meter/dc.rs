//! # DC Meter Family
//!
//! Register model, metrics parsing and command constructors for the DC
//! shunt module. A full metrics read returns eight input registers (16-byte
//! body); the options block is four holding registers (high/low alarm
//! thresholds, slave address, shunt range).
//!
//! The DC bus runs with two stop bits; see
//! [`PortConfig::dc_bus`](crate::transport::PortConfig::dc_bus).

use crate::constants::*;
use crate::meter::frame::{self, RxFrame, TxFrame};
use crate::meter::{ErrKind, Measure};
use nom::number::complete::be_u16;
use nom::sequence::tuple;
use nom::IResult;
use std::time::{Duration, Instant};

const TAG: &str = "emeter::dc";

/// Selectable external shunt ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Shunt {
    #[default]
    A100 = 0,
    A50 = 1,
    A200 = 2,
    A300 = 3,
}

impl Shunt {
    /// Maps a shunt register value; out-of-range values read back as 100 A.
    pub fn from_wire(value: u8) -> Shunt {
        match value {
            1 => Shunt::A50,
            2 => Shunt::A200,
            3 => Shunt::A300,
            _ => Shunt::A100,
        }
    }
}

/// Raw metrics block of the DC module, in wire units.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DcMetrics {
    /// centi-volts
    pub voltage: u16,
    /// centi-amperes
    pub current: u16,
    /// deci-watts
    pub power: u32,
    /// watt-hours
    pub energy: u32,
    /// high-voltage alarm latch register
    pub alarm_h: u16,
    /// low-voltage alarm latch register
    pub alarm_l: u16,
}

#[allow(clippy::type_complexity)]
fn registers8(input: &[u8]) -> IResult<&[u8], (u16, u16, u16, u16, u16, u16, u16, u16)> {
    tuple((be_u16, be_u16, be_u16, be_u16, be_u16, be_u16, be_u16, be_u16))(input)
}

fn registers4(input: &[u8]) -> IResult<&[u8], (u16, u16, u16, u16)> {
    tuple((be_u16, be_u16, be_u16, be_u16))(input)
}

impl DcMetrics {
    /// Tries to interpret `msg` as a full metrics reply and load it.
    pub fn parse(&mut self, msg: &RxFrame) -> bool {
        let raw = msg.raw();
        if msg.cmd() != CMD_RIR || raw.get(2).copied() != Some(DC_RIR_RESP_LEN) {
            return false;
        }
        let end = 3 + DC_RIR_RESP_LEN as usize;
        if raw.len() < end + 2 {
            return false;
        }
        let Ok((_, (v, cur, pow_l, pow_h, en_l, en_h, alarm_h, alarm_l))) =
            registers8(&raw[3..end])
        else {
            return false;
        };
        log::trace!(target: TAG, "metrics reply from {}", msg.addr());

        self.voltage = v;
        self.current = cur;
        self.power = u32::from(pow_l) | u32::from(pow_h) << 16;
        self.energy = u32::from(en_l) | u32::from(en_h) << 16;
        self.alarm_h = alarm_h;
        self.alarm_l = alarm_l;
        true
    }

    /// True when the high-voltage alarm latch is set.
    pub fn alarm_high(&self) -> bool {
        self.alarm_h != ALARM_ABSENT
    }

    /// True when the low-voltage alarm latch is set.
    pub fn alarm_low(&self) -> bool {
        self.alarm_l != ALARM_ABSENT
    }

    /// Converts a measure to engineering units.
    pub fn as_float(&self, m: Measure) -> f32 {
        match m {
            Measure::Voltage => f32::from(self.voltage) / 100.0,
            Measure::Current => f32::from(self.current) / 100.0,
            Measure::Power => self.power as f32 / 10.0,
            Measure::Energy => self.energy as f32,
            Measure::AlarmHigh => {
                if self.alarm_high() {
                    1.0
                } else {
                    0.0
                }
            }
            Measure::AlarmLow => {
                if self.alarm_low() {
                    1.0
                } else {
                    0.0
                }
            }
            Measure::Frequency | Measure::PowerFactor => f32::NAN,
        }
    }
}

/// Full state of one DC meter.
#[derive(Debug, Clone, Copy)]
pub struct DcState {
    /// Configured slave address
    pub addr: u8,
    /// Last recorded error condition
    pub err: ErrKind,
    /// When the last request was handed to the port
    pub last_poll: Option<Instant>,
    /// When the last reply was successfully applied
    pub last_update: Option<Instant>,
    /// Latest metrics block
    pub metrics: DcMetrics,
    /// High alarm threshold
    pub alarm_h_thr: u16,
    /// Low alarm threshold
    pub alarm_l_thr: u16,
    /// Configured shunt range
    pub shunt: Shunt,
}

impl DcState {
    pub fn new(addr: u8) -> Self {
        DcState {
            addr,
            err: ErrKind::Ok,
            last_poll: None,
            last_update: None,
            metrics: DcMetrics::default(),
            alarm_h_thr: 0,
            alarm_l_thr: 0,
            shunt: Shunt::A100,
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

    /// Applies a decoded reply to the state; see
    /// [`AcState::apply`](crate::meter::ac::AcState::apply) for the shared
    /// rules.
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
                if raw.get(2).copied() == Some((DC_RHR_COUNT * 2) as u8) && raw.len() >= 13 {
                    if let Ok((_, (thr_h, thr_l, addr_reg, shunt_reg))) = registers4(&raw[3..11]) {
                        self.alarm_h_thr = thr_h;
                        self.alarm_l_thr = thr_l;
                        self.addr = (addr_reg & 0x00FF) as u8;
                        self.shunt = Shunt::from_wire((shunt_reg & 0x00FF) as u8);
                    }
                }
            }
            CMD_WSR => {
                if raw.len() >= GENERIC_MSG_SIZE {
                    let reg = u16::from_be_bytes([raw[2], raw[3]]);
                    let value = u16::from_be_bytes([raw[4], raw[5]]);
                    match reg {
                        DC_RHR_ALARM_H => self.alarm_h_thr = value,
                        DC_RHR_ALARM_L => self.alarm_l_thr = value,
                        DC_RHR_ADDR => self.addr = (value & 0x00FF) as u8,
                        DC_RHR_SHUNT => self.shunt = Shunt::from_wire((value & 0x00FF) as u8),
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
    frame::create_request(CMD_RIR, DC_RIR_BEGIN, DC_RIR_COUNT, addr, true)
}

/// Request for the full options block (thresholds, address, shunt range).
pub fn cmd_get_opts(addr: u8) -> TxFrame {
    frame::create_request(CMD_RHR, DC_RHR_BEGIN, DC_RHR_COUNT, addr, true)
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

/// Request to set the high alarm threshold.
pub fn cmd_set_alarm_h_thr(value: u16, addr: u8) -> TxFrame {
    frame::create_request(CMD_WSR, DC_RHR_ALARM_H, value, addr, true)
}

/// Request to set the low alarm threshold.
pub fn cmd_set_alarm_l_thr(value: u16, addr: u8) -> TxFrame {
    frame::create_request(CMD_WSR, DC_RHR_ALARM_L, value, addr, true)
}

/// Request to select the external shunt range.
pub fn cmd_set_shunt(shunt: Shunt, addr: u8) -> TxFrame {
    frame::create_request(CMD_WSR, DC_RHR_SHUNT, shunt as u16, addr, true)
}

pub fn cmd_energy_reset(addr: u8) -> TxFrame {
    super::cmd_energy_reset(addr)
}
