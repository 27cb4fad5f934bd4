//! # Simulated Meter
//!
//! A meter object that bypasses the transport entirely: every
//! `update_metrics` call jitters the stored metrics in place and fires the
//! user callback with no wire frame. Useful for exercising collectors and
//! application code without hardware on the bus.

use crate::constants::ALARM_PRESENT;
use crate::meter::ac::{AcMetrics, AcState};
use crate::meter::device::{DeviceCommon, Meter, RxCallback};
use crate::meter::frame::RxFrame;
use crate::meter::MeterModel;
use crate::transport::MsgQueue;
use rand::Rng;
use std::any::Any;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

const TAG: &str = "emeter::sim";

/// One dW·ms in terms of a watt-hour.
const DW_MS_PER_WH: u64 = 36_000_000;

/// Per-field randomization: maximum deviation from the nominal value and
/// the probability that a tick changes the field at all.
#[derive(Debug, Clone, Copy)]
pub struct Jitter {
    /// Largest offset applied, in raw register units
    pub span: u16,
    /// Probability of applying an offset on a tick, 0.0..=1.0
    pub chance: f64,
}

/// Baselines and jitter settings of the simulated meter.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Values the fields jitter around
    pub nominal: AcMetrics,
    pub voltage: Jitter,
    pub current: Jitter,
    pub freq: Jitter,
    pub pf: Jitter,
    /// Power alarm threshold in watts, 0 disables the alarm
    pub alarm_thr: u16,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            nominal: AcMetrics {
                voltage: 2300, // 230.0 V
                current: 2000, // 2.000 A
                power: 0,      // derived
                energy: 0,
                freq: 500, // 50.0 Hz
                pf: 95,
                alarm: 0,
            },
            voltage: Jitter {
                span: 25,
                chance: 0.8,
            },
            current: Jitter {
                span: 400,
                chance: 0.5,
            },
            freq: Jitter {
                span: 3,
                chance: 0.3,
            },
            pf: Jitter {
                span: 5,
                chance: 0.4,
            },
            alarm_thr: 0,
        }
    }
}

struct SimClock {
    last_tick: Option<Instant>,
    /// Energy remainder below one watt-hour, in dW·ms
    spill: u64,
}

/// Simulated AC meter.
pub struct SimAcMeter {
    common: DeviceCommon,
    cfg: SimConfig,
    state: RwLock<AcState>,
    clock: Mutex<SimClock>,
}

impl SimAcMeter {
    pub fn new(id: u8, modbus_addr: u8, descr: Option<&str>, cfg: SimConfig) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<SimAcMeter>| {
            let weak: Weak<dyn Meter> = me.clone();
            let mut state = AcState::new(modbus_addr);
            state.metrics = cfg.nominal;
            state.alarm_thr = cfg.alarm_thr;
            SimAcMeter {
                common: DeviceCommon::new(id, descr, weak),
                cfg,
                state: RwLock::new(state),
                clock: Mutex::new(SimClock {
                    last_tick: None,
                    spill: 0,
                }),
            }
        })
    }

    /// Snapshot of the full meter state.
    pub fn state(&self) -> AcState {
        *self.state.read().unwrap()
    }

    /// Snapshot of the latest metrics block.
    pub fn metrics(&self) -> AcMetrics {
        self.state.read().unwrap().metrics
    }
}

fn jitter_u16(rng: &mut impl Rng, nominal: u16, j: Jitter) -> u16 {
    if j.span == 0 || !rng.gen_bool(j.chance.clamp(0.0, 1.0)) {
        return nominal;
    }
    let span = i32::from(j.span);
    let offset = rng.gen_range(-span..=span);
    (i32::from(nominal) + offset).clamp(0, i32::from(u16::MAX)) as u16
}

fn jitter_u32(rng: &mut impl Rng, nominal: u32, j: Jitter) -> u32 {
    if j.span == 0 || !rng.gen_bool(j.chance.clamp(0.0, 1.0)) {
        return nominal;
    }
    let span = i64::from(j.span);
    let offset = rng.gen_range(-span..=span);
    (i64::from(nominal) + offset).max(0) as u32
}

impl Meter for SimAcMeter {
    fn id(&self) -> u8 {
        self.common.id
    }

    fn descr(&self) -> &str {
        self.common.descr()
    }

    fn model(&self) -> MeterModel {
        MeterModel::Ac
    }

    fn addr(&self) -> u8 {
        self.state.read().unwrap().addr
    }

    fn attach_port(&self, _q: Arc<dyn MsgQueue>, _tx_only: bool) {
        log::debug!(target: TAG, "simulated meter {} ignores transports", self.common.id);
    }

    fn detach_port(&self) {}

    /// Rolls new metrics and integrates energy over the elapsed interval.
    fn update_metrics(&self) {
        let now = Instant::now();
        let dt_ms = {
            let mut clock = self.clock.lock().unwrap();
            let dt = clock
                .last_tick
                .map(|t| now.duration_since(t).as_millis() as u64)
                .unwrap_or(0);
            clock.last_tick = Some(now);
            dt
        };

        {
            let mut rng = rand::thread_rng();
            let mut state = self.state.write().unwrap();
            state.mark_polled();

            let m = &mut state.metrics;
            m.voltage = jitter_u16(&mut rng, self.cfg.nominal.voltage, self.cfg.voltage);
            m.current = jitter_u32(&mut rng, self.cfg.nominal.current, self.cfg.current);
            m.freq = jitter_u16(&mut rng, self.cfg.nominal.freq, self.cfg.freq);
            m.pf = jitter_u16(&mut rng, self.cfg.nominal.pf, self.cfg.pf);

            // P[dW] = V[dV] * I[mA] * pf / 100_000
            m.power =
                (u64::from(m.voltage) * u64::from(m.current) * u64::from(m.pf) / 100_000) as u32;

            // integrate energy, carrying the sub-Wh remainder forward
            let mut clock = self.clock.lock().unwrap();
            clock.spill += u64::from(m.power) * dt_ms;
            let wh = clock.spill / DW_MS_PER_WH;
            clock.spill -= wh * DW_MS_PER_WH;
            m.energy = m.energy.saturating_add(wh as u32);

            if self.cfg.alarm_thr > 0 && m.power / 10 >= u32::from(self.cfg.alarm_thr) {
                m.alarm = ALARM_PRESENT;
            }

            state.err = crate::meter::ErrKind::Ok;
            state.last_update = Some(now);
        }

        // no wire frame backs a simulated update
        self.common.fire_callback(None);
    }

    fn rx_sink(&self, _msg: &RxFrame) {}

    fn reset_energy(&self) {
        let mut state = self.state.write().unwrap();
        state.metrics.energy = 0;
        self.clock.lock().unwrap().spill = 0;
    }

    fn attach_callback(&self, f: RxCallback) {
        self.common.set_callback(Some(f));
    }

    fn detach_callback(&self) {
        self.common.set_callback(None);
    }

    fn autopoll(&self) -> bool {
        self.common.autopoll()
    }

    fn set_autopoll(&self, enable: bool) -> bool {
        self.common.set_autopoll(enable)
    }

    fn poll_period(&self) -> u64 {
        self.common.poll_period()
    }

    fn set_poll_period(&self, period_ms: u64) -> bool {
        self.common.set_poll_period(period_ms)
    }

    fn data_age(&self) -> Option<Duration> {
        self.state.read().unwrap().data_age()
    }

    fn data_stale(&self) -> bool {
        self.state.read().unwrap().data_stale()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
