//! # Meter Pool
//!
//! The pool owns ports and meters and routes every received frame to the
//! meter registered under the matching `(port id, slave address)` pair.
//! Meters join their port in TX-only mode; the pool installs its own
//! dispatcher as each port's RX handler instead, then fans successfully
//! applied replies out to the pool-level user callback.
//!
//! Registry rules: port ids are unique, meter ids are unique, and no two
//! meters share a `(port, slave address)` pair. Pool members must carry a
//! real slave address in 1..=247; the broadcast and catch-all addresses are
//! for standalone meters only.
//!
//! The registries are read by the port RX workers and written by the
//! application; both sides go through reader/writer locks. The user
//! callback runs on an RX worker task: it must not block and must not call
//! back into `add_meter`/`remove_meter`.

use crate::constants::{ADDR_MAX, ADDR_MIN, POLLER_MIN_PERIOD_MS, POLLER_PERIOD_MS};
use crate::error::MeterBusError;
use crate::meter::device::{AcDevice, DcDevice, Meter, RxCallback};
use crate::meter::frame::RxFrame;
use crate::meter::MeterModel;
use crate::transport::{MsgQueue, PortConfig, SerialPortQueue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const TAG: &str = "emeter::pool";

/// One bus endpoint: a transport with an id, a description and a running
/// flag.
pub struct Port {
    pub id: u8,
    descr: String,
    q: Arc<dyn MsgQueue>,
}

impl Port {
    /// Wraps an existing transport and starts it. A transport that is
    /// already running is left as it is.
    pub fn new(id: u8, q: Arc<dyn MsgQueue>, descr: Option<&str>) -> Self {
        match q.start() {
            Ok(()) | Err(MeterBusError::AlreadyRunning) => {}
            Err(e) => log::warn!(target: TAG, "port {id} failed to start: {e}"),
        }
        let descr = match descr {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => format!("Port-{id}"),
        };
        Port { id, descr, q }
    }

    /// Opens and starts a UART transport, propagating open failures.
    pub fn serial(id: u8, cfg: PortConfig, descr: Option<&str>) -> Result<Self, MeterBusError> {
        let q: Arc<dyn MsgQueue> = Arc::new(SerialPortQueue::new(cfg));
        q.start()?;
        Ok(Port {
            id,
            descr: match descr {
                Some(s) if !s.is_empty() => s.to_string(),
                _ => format!("Port-{id}"),
            },
            q,
        })
    }

    pub fn descr(&self) -> &str {
        &self.descr
    }

    pub fn queue(&self) -> &Arc<dyn MsgQueue> {
        &self.q
    }

    /// True while the transport workers are running.
    pub fn active(&self) -> bool {
        self.q.running()
    }

    /// Starts or stops the transport workers; returns the resulting state.
    pub fn set_active(&self, on: bool) -> bool {
        if on {
            match self.q.start() {
                Ok(()) | Err(MeterBusError::AlreadyRunning) => {}
                Err(e) => log::warn!(target: TAG, "port {} failed to start: {e}", self.id),
            }
        } else {
            self.q.stop();
        }
        self.q.running()
    }
}

struct PoolNode {
    port: Arc<Port>,
    meter: Arc<dyn Meter>,
}

/// Pool of ports and meters with RX dispatch and periodic polling.
pub struct MeterPool {
    me: Weak<MeterPool>,
    ports: RwLock<Vec<Arc<Port>>>,
    meters: RwLock<Vec<PoolNode>>,
    callback: RwLock<Option<RxCallback>>,
    poller: Mutex<Option<JoinHandle<()>>>,
    poll_period_ms: AtomicU64,
}

impl MeterPool {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| MeterPool {
            me: me.clone(),
            ports: RwLock::new(Vec::new()),
            meters: RwLock::new(Vec::new()),
            callback: RwLock::new(None),
            poller: Mutex::new(None),
            poll_period_ms: AtomicU64::new(POLLER_PERIOD_MS),
        })
    }

    /// Registers a port and redirects its RX side to the pool dispatcher.
    ///
    /// Returns false when a port with this id already exists.
    pub fn add_port(&self, port: Port) -> bool {
        let port = Arc::new(port);
        {
            let mut ports = self.ports.write().unwrap();
            if ports.iter().any(|p| p.id == port.id) {
                return false;
            }
            ports.push(port.clone());
        }

        // the dispatcher closure carries the port id it serves
        let weak = self.me.clone();
        let port_id = port.id;
        port.queue().attach_rx_handler(Arc::new(move |msg| {
            if let Some(pool) = weak.upgrade() {
                pool.dispatch(port_id, msg);
            }
        }));
        true
    }

    /// Creates, starts and registers a UART port in one call.
    pub fn add_serial_port(
        &self,
        id: u8,
        cfg: PortConfig,
        descr: Option<&str>,
    ) -> Result<bool, MeterBusError> {
        let port = Port::serial(id, cfg, descr)?;
        Ok(self.add_port(port))
    }

    /// Creates a meter of the given family and registers it on a port.
    ///
    /// Rejected with false when the address is outside 1..=247, the port
    /// does not exist, the meter id is taken, or another meter already
    /// holds the same `(port, address)` pair.
    pub fn add_meter(
        &self,
        port_id: u8,
        meter_id: u8,
        modbus_addr: u8,
        model: MeterModel,
        descr: Option<&str>,
    ) -> bool {
        let meter: Arc<dyn Meter> = match model {
            MeterModel::Ac => AcDevice::new(meter_id, modbus_addr, descr),
            MeterModel::Dc => DcDevice::new(meter_id, modbus_addr, descr),
        };
        self.add_meter_object(port_id, meter)
    }

    /// Registers an externally created meter object on a port.
    pub fn add_meter_object(&self, port_id: u8, meter: Arc<dyn Meter>) -> bool {
        let addr = meter.addr();
        if !(ADDR_MIN..=ADDR_MAX).contains(&addr) {
            log::warn!(target: TAG, "rejecting meter {}: address {addr} not usable in a pool", meter.id());
            return false;
        }

        let Some(port) = self.port_by_id(port_id) else {
            log::warn!(target: TAG, "rejecting meter {}: no port {port_id}", meter.id());
            return false;
        };

        let mut meters = self.meters.write().unwrap();
        if meters.iter().any(|n| n.meter.id() == meter.id()) {
            return false;
        }
        if meters
            .iter()
            .any(|n| n.port.id == port_id && n.meter.addr() == addr)
        {
            return false;
        }

        // RX delivery goes through the pool dispatcher, the port is shared
        // for TX only
        meter.detach_callback();
        meter.detach_port();
        meter.attach_port(port.queue().clone(), true);

        meters.push(PoolNode { port, meter });
        true
    }

    /// Removes a meter from the pool, releasing its port attachment.
    pub fn remove_meter(&self, meter_id: u8) -> bool {
        let mut meters = self.meters.write().unwrap();
        let Some(idx) = meters.iter().position(|n| n.meter.id() == meter_id) else {
            return false;
        };
        let node = meters.remove(idx);
        node.meter.detach_port();
        true
    }

    pub fn exist_port(&self, id: u8) -> bool {
        self.port_by_id(id).is_some()
    }

    pub fn exist_meter(&self, id: u8) -> bool {
        self.meter_by_id(id).is_some()
    }

    /// Looks up a registered meter by id.
    pub fn meter(&self, id: u8) -> Option<Arc<dyn Meter>> {
        self.meter_by_id(id)
    }

    /// Description of a registered meter, if present.
    pub fn descr(&self, id: u8) -> Option<String> {
        self.meter_by_id(id).map(|m| m.descr().to_string())
    }

    /// Requests fresh metrics from every registered meter.
    pub fn update_metrics(&self) {
        let meters = self.meters.read().unwrap();
        for node in meters.iter() {
            node.meter.update_metrics();
        }
    }

    /// Attaches the pool-level callback, fired once per dispatched reply.
    pub fn attach_callback(&self, f: RxCallback) {
        *self.callback.write().unwrap() = Some(f);
    }

    pub fn detach_callback(&self) {
        *self.callback.write().unwrap() = None;
    }

    /// True while the pool poll timer is running.
    pub fn autopoll(&self) -> bool {
        self.poller.lock().unwrap().is_some()
    }

    /// Starts or stops the pool poll timer. Stopping returns false when no
    /// timer was running.
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

    /// Poll period in milliseconds.
    pub fn poll_period(&self) -> u64 {
        self.poll_period_ms.load(Ordering::Relaxed)
    }

    /// Changes the poll period; takes effect with the next tick. Rejects
    /// periods shorter than one full request/reply turnaround.
    pub fn set_poll_period(&self, period_ms: u64) -> bool {
        if period_ms < POLLER_MIN_PERIOD_MS {
            return false;
        }
        self.poll_period_ms.store(period_ms, Ordering::Relaxed);
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
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                pool.update_metrics();
            }
        })
    }

    fn port_by_id(&self, id: u8) -> Option<Arc<Port>> {
        self.ports.read().unwrap().iter().find(|p| p.id == id).cloned()
    }

    fn meter_by_id(&self, id: u8) -> Option<Arc<dyn Meter>> {
        self.meters
            .read()
            .unwrap()
            .iter()
            .find(|n| n.meter.id() == id)
            .map(|n| n.meter.clone())
    }

    /// Routes one received frame to the meter registered under
    /// `(port_id, slave address)`.
    fn dispatch(&self, port_id: u8, msg: RxFrame) {
        if !msg.valid {
            log::debug!(target: TAG, "dropping frame with bad CRC on port {port_id}: {}", msg.hexdump());
            return;
        }

        let target = {
            let meters = self.meters.read().unwrap();
            meters
                .iter()
                .find(|n| n.port.id == port_id && n.meter.addr() == msg.addr())
                .map(|n| n.meter.clone())
        };

        match target {
            Some(meter) => {
                meter.rx_sink(&msg);
                let cb = self.callback.read().unwrap().clone();
                if let Some(cb) = cb {
                    cb(meter.id(), Some(&msg));
                }
            }
            None => {
                log::debug!(
                    target: TAG,
                    "stray packet on port {port_id} for address {}: {}",
                    msg.addr(),
                    msg.hexdump()
                );
            }
        }
    }
}

impl Drop for MeterPool {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.lock().unwrap().take() {
            handle.abort();
        }
    }
}
