//! # Meter Device Objects
//!
//! A device object wraps one physical meter: it owns the meter state,
//! emits requests through an attached transport and consumes the replies
//! that the transport (or the pool dispatcher) feeds back into it.
//!
//! The transport TX side is always shared between the meters on a bus; the
//! RX handler can belong to only one consumer. A standalone meter installs
//! itself as that consumer on attach; in a pool the port is attached
//! `tx_only` and replies are routed through the pool dispatcher instead.
//!
//! Devices are created behind `Arc` and are neither cloned nor moved:
//! identity matters, the auto-poll task and the transport RX handler refer
//! back to the device through a weak handle.

use crate::constants::{POLLER_MIN_PERIOD_MS, POLLER_PERIOD_MS};
use crate::meter::ac::{self, AcMetrics, AcState};
use crate::meter::dc::{self, DcMetrics, DcState, Shunt};
use crate::meter::frame::RxFrame;
use crate::meter::MeterModel;
use crate::transport::MsgQueue;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const TAG: &str = "emeter::device";

/// User callback fired once per successfully applied reply. Simulated
/// meters fire it with `None` to signal fresh data without a wire frame.
pub type RxCallback = Arc<dyn Fn(u8, Option<&RxFrame>) + Send + Sync>;

/// Capability surface shared by every meter object.
pub trait Meter: Send + Sync {
    /// Application-level meter id, distinct from the slave address.
    fn id(&self) -> u8;

    /// Mnemonic description.
    fn descr(&self) -> &str;

    fn model(&self) -> MeterModel;

    /// Configured Modbus slave address.
    fn addr(&self) -> u8;

    /// Attaches a transport. With `tx_only` the meter shares the bus and
    /// leaves the RX side to an external dispatcher; otherwise it installs
    /// itself as the transport's RX sink.
    fn attach_port(&self, q: Arc<dyn MsgQueue>, tx_only: bool);

    /// Releases the transport, removing the RX sink if one was installed.
    fn detach_port(&self);

    /// Emits a metrics request through the attached transport.
    fn update_metrics(&self);

    /// Consumes one decoded reply. Frames with a foreign slave address are
    /// silently ignored.
    fn rx_sink(&self, msg: &RxFrame);

    /// Emits an energy counter reset request.
    fn reset_energy(&self);

    fn attach_callback(&self, f: RxCallback);
    fn detach_callback(&self);

    /// True while the auto-poll timer is running.
    fn autopoll(&self) -> bool;

    /// Starts or stops the auto-poll timer. Stopping returns false when no
    /// timer was running.
    fn set_autopoll(&self, enable: bool) -> bool;

    /// Auto-poll period in milliseconds.
    fn poll_period(&self) -> u64;

    /// Changes the auto-poll period. Rejects periods shorter than one full
    /// request/reply turnaround; takes effect with the next tick.
    fn set_poll_period(&self, period_ms: u64) -> bool;

    /// Time since the last successful state update.
    fn data_age(&self) -> Option<Duration>;

    /// True when no update arrived for over twice the meter refresh period.
    fn data_stale(&self) -> bool;

    /// Escape hatch for family-specific state access.
    fn as_any(&self) -> &dyn Any;
}

/// Fields and plumbing shared by the device implementations.
pub(crate) struct DeviceCommon {
    pub id: u8,
    descr: String,
    me: Weak<dyn Meter>,
    q: RwLock<Option<Arc<dyn MsgQueue>>>,
    /// We installed ourselves as the transport RX handler
    sink_lock: AtomicBool,
    callback: RwLock<Option<RxCallback>>,
    poller: Mutex<Option<JoinHandle<()>>>,
    poll_period_ms: AtomicU64,
}

impl DeviceCommon {
    pub fn new(id: u8, descr: Option<&str>, me: Weak<dyn Meter>) -> Self {
        let descr = match descr {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => format!("PM-{id}"),
        };
        DeviceCommon {
            id,
            descr,
            me,
            q: RwLock::new(None),
            sink_lock: AtomicBool::new(false),
            callback: RwLock::new(None),
            poller: Mutex::new(None),
            poll_period_ms: AtomicU64::new(POLLER_PERIOD_MS),
        }
    }

    pub fn descr(&self) -> &str {
        &self.descr
    }

    pub fn attach_queue(&self, q: Arc<dyn MsgQueue>, tx_only: bool) {
        let mut slot = self.q.write().unwrap();
        if slot.is_some() {
            log::debug!(target: TAG, "meter {} already has a port attached", self.id);
            return;
        }
        if !tx_only {
            let weak = self.me.clone();
            q.attach_rx_handler(Arc::new(move |msg| {
                if let Some(meter) = weak.upgrade() {
                    meter.rx_sink(&msg);
                }
            }));
            self.sink_lock.store(true, Ordering::Release);
        }
        *slot = Some(q);
    }

    pub fn detach_queue(&self) {
        let mut slot = self.q.write().unwrap();
        let Some(q) = slot.take() else { return };
        if self.sink_lock.swap(false, Ordering::AcqRel) {
            q.detach_rx_handler();
        }
    }

    pub fn attached(&self) -> bool {
        self.q.read().unwrap().is_some()
    }

    pub fn enqueue(&self, msg: crate::meter::frame::TxFrame) -> bool {
        let q = self.q.read().unwrap().clone();
        match q {
            Some(q) => q.tx_enqueue(msg),
            None => {
                log::debug!(target: TAG, "meter {} has no port, request dropped", self.id);
                false
            }
        }
    }

    pub fn set_callback(&self, f: Option<RxCallback>) {
        *self.callback.write().unwrap() = f;
    }

    pub fn fire_callback(&self, msg: Option<&RxFrame>) {
        let cb = self.callback.read().unwrap().clone();
        if let Some(cb) = cb {
            cb(self.id, msg);
        }
    }

    pub fn autopoll(&self) -> bool {
        self.poller.lock().unwrap().is_some()
    }

    pub fn set_autopoll(&self, enable: bool) -> bool {
        let mut slot = self.poller.lock().unwrap();
        if enable {
            if slot.is_none() {
                *slot = Some(self.spawn_poller());
            }
            true
        } else {
            match slot.take() {
                Some(handle) => {
                    handle.abort();
                    true
                }
                None => false,
            }
        }
    }

    pub fn poll_period(&self) -> u64 {
        self.poll_period_ms.load(Ordering::Relaxed)
    }

    pub fn set_poll_period(&self, period_ms: u64) -> bool {
        if period_ms < POLLER_MIN_PERIOD_MS {
            return false;
        }
        self.poll_period_ms.store(period_ms, Ordering::Relaxed);
        // restart a running timer so the new period applies from the next tick
        let mut slot = self.poller.lock().unwrap();
        if let Some(handle) = slot.take() {
            handle.abort();
            *slot = Some(self.spawn_poller());
        }
        true
    }

    fn spawn_poller(&self) -> JoinHandle<()> {
        let weak = self.me.clone();
        let period = Duration::from_millis(self.poll_period_ms.load(Ordering::Relaxed));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick of an interval completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(meter) = weak.upgrade() else { break };
                meter.update_metrics();
            }
        })
    }
}

impl Drop for DeviceCommon {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.lock().unwrap().take() {
            handle.abort();
        }
    }
}

/// One AC meter on a bus.
pub struct AcDevice {
    common: DeviceCommon,
    state: RwLock<AcState>,
}

impl AcDevice {
    pub fn new(id: u8, modbus_addr: u8, descr: Option<&str>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<AcDevice>| {
            let weak: Weak<dyn Meter> = me.clone();
            AcDevice {
                common: DeviceCommon::new(id, descr, weak),
                state: RwLock::new(AcState::new(modbus_addr)),
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

    /// Requests the options block (alarm threshold and address).
    pub fn request_opts(&self) -> bool {
        let addr = self.addr();
        self.common.enqueue(ac::cmd_get_opts(addr))
    }

    /// Requests a new power alarm threshold in watts.
    pub fn set_alarm_thr(&self, watts: u16) -> bool {
        let addr = self.addr();
        self.common.enqueue(ac::cmd_set_alarm_thr(watts, addr))
    }

    /// Requests a slave address change. An out-of-range address falls back
    /// to the current one on the wire.
    pub fn set_addr(&self, new_addr: u8) -> bool {
        let addr = self.addr();
        self.common.enqueue(ac::cmd_set_modbus_addr(new_addr, addr))
    }
}

impl Meter for AcDevice {
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

    fn attach_port(&self, q: Arc<dyn MsgQueue>, tx_only: bool) {
        self.common.attach_queue(q, tx_only);
    }

    fn detach_port(&self) {
        self.common.detach_queue();
    }

    fn update_metrics(&self) {
        if !self.common.attached() {
            return;
        }
        let addr = {
            let mut state = self.state.write().unwrap();
            state.mark_polled();
            state.addr
        };
        self.common.enqueue(ac::cmd_get_metrics(addr));
    }

    fn rx_sink(&self, msg: &RxFrame) {
        if self.state.write().unwrap().apply(msg) {
            self.common.fire_callback(Some(msg));
        }
    }

    fn reset_energy(&self) {
        let addr = self.addr();
        self.common.enqueue(ac::cmd_energy_reset(addr));
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

/// One DC meter on a bus.
pub struct DcDevice {
    common: DeviceCommon,
    state: RwLock<DcState>,
}

impl DcDevice {
    pub fn new(id: u8, modbus_addr: u8, descr: Option<&str>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<DcDevice>| {
            let weak: Weak<dyn Meter> = me.clone();
            DcDevice {
                common: DeviceCommon::new(id, descr, weak),
                state: RwLock::new(DcState::new(modbus_addr)),
            }
        })
    }

    /// Snapshot of the full meter state.
    pub fn state(&self) -> DcState {
        *self.state.read().unwrap()
    }

    /// Snapshot of the latest metrics block.
    pub fn metrics(&self) -> DcMetrics {
        self.state.read().unwrap().metrics
    }

    /// Requests the options block (thresholds, address, shunt range).
    pub fn request_opts(&self) -> bool {
        let addr = self.addr();
        self.common.enqueue(dc::cmd_get_opts(addr))
    }

    /// Requests an external shunt range change.
    pub fn set_shunt(&self, shunt: Shunt) -> bool {
        let addr = self.addr();
        self.common.enqueue(dc::cmd_set_shunt(shunt, addr))
    }

    /// Requests a new high alarm threshold.
    pub fn set_alarm_h_thr(&self, value: u16) -> bool {
        let addr = self.addr();
        self.common.enqueue(dc::cmd_set_alarm_h_thr(value, addr))
    }

    /// Requests a new low alarm threshold.
    pub fn set_alarm_l_thr(&self, value: u16) -> bool {
        let addr = self.addr();
        self.common.enqueue(dc::cmd_set_alarm_l_thr(value, addr))
    }

    /// Requests a slave address change. An out-of-range address falls back
    /// to the current one on the wire.
    pub fn set_addr(&self, new_addr: u8) -> bool {
        let addr = self.addr();
        self.common.enqueue(dc::cmd_set_modbus_addr(new_addr, addr))
    }
}

impl Meter for DcDevice {
    fn id(&self) -> u8 {
        self.common.id
    }

    fn descr(&self) -> &str {
        self.common.descr()
    }

    fn model(&self) -> MeterModel {
        MeterModel::Dc
    }

    fn addr(&self) -> u8 {
        self.state.read().unwrap().addr
    }

    fn attach_port(&self, q: Arc<dyn MsgQueue>, tx_only: bool) {
        self.common.attach_queue(q, tx_only);
    }

    fn detach_port(&self) {
        self.common.detach_queue();
    }

    fn update_metrics(&self) {
        if !self.common.attached() {
            return;
        }
        let addr = {
            let mut state = self.state.write().unwrap();
            state.mark_polled();
            state.addr
        };
        self.common.enqueue(dc::cmd_get_metrics(addr));
    }

    fn rx_sink(&self, msg: &RxFrame) {
        if self.state.write().unwrap().apply(msg) {
            self.common.fire_callback(Some(msg));
        }
    }

    fn reset_energy(&self) {
        let addr = self.addr();
        self.common.enqueue(dc::cmd_energy_reset(addr));
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
