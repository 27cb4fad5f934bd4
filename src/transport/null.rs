//! # Null Transport
//!
//! [`NullQueue`] skips the UART entirely: a frame given to `tx_enqueue` is
//! delivered synchronously to an attached TX consumer, and anything fed to
//! [`NullQueue::rx_enqueue`] goes straight to the RX handler. Two null
//! queues cross-connected back to back form a [`NullCable`], a virtual
//! null-modem link that lets the dispatcher and meter pipeline run without
//! hardware.

use crate::error::MeterBusError;
use crate::meter::frame::{RxFrame, TxFrame};
use crate::transport::{MsgQueue, RxHandler, TxHandler};
use std::sync::{Arc, RwLock};

const TAG: &str = "emeter::null";

/// Queue-less transport delivering frames synchronously to its handlers.
#[derive(Default)]
pub struct NullQueue {
    rx_handler: RwLock<Option<RxHandler>>,
    tx_handler: RwLock<Option<TxHandler>>,
}

impl NullQueue {
    pub fn new() -> Self {
        NullQueue::default()
    }

    /// Attaches the consumer for outbound frames. With a consumer attached
    /// every enqueued frame is handed over immediately, no queueing is done.
    pub fn attach_tx_handler(&self, f: TxHandler) {
        *self.tx_handler.write().unwrap() = Some(f);
    }

    pub fn detach_tx_handler(&self) {
        *self.tx_handler.write().unwrap() = None;
    }

    /// Feeds an inbound frame straight to the RX handler.
    ///
    /// Returns false (destroying the frame) when no handler is attached.
    pub fn rx_enqueue(&self, msg: RxFrame) -> bool {
        let cb = self.rx_handler.read().unwrap().clone();
        match cb {
            Some(cb) => {
                cb(msg);
                true
            }
            None => false,
        }
    }
}

impl MsgQueue for NullQueue {
    fn tx_enqueue(&self, msg: TxFrame) -> bool {
        let cb = self.tx_handler.read().unwrap().clone();
        match cb {
            Some(cb) => {
                cb(msg);
                true
            }
            None => {
                log::debug!(target: TAG, "TX frame dropped, no consumer attached");
                false
            }
        }
    }

    fn attach_rx_handler(&self, f: RxHandler) {
        *self.rx_handler.write().unwrap() = Some(f);
    }

    fn detach_rx_handler(&self) {
        *self.rx_handler.write().unwrap() = None;
    }

    fn start(&self) -> Result<(), MeterBusError> {
        Ok(())
    }

    fn stop(&self) {
        self.detach_rx_handler();
        self.detach_tx_handler();
    }

    fn running(&self) -> bool {
        true
    }
}

/// Virtual null-modem cable: transmissions on one end surface as received
/// frames on the other.
pub struct NullCable {
    pub port_a: Arc<NullQueue>,
    pub port_b: Arc<NullQueue>,
}

impl NullCable {
    pub fn new() -> Self {
        let port_a = Arc::new(NullQueue::new());
        let port_b = Arc::new(NullQueue::new());

        let b = port_b.clone();
        port_a.attach_tx_handler(Arc::new(move |tm: TxFrame| {
            b.rx_enqueue(RxFrame::new(tm.data));
        }));
        let a = port_a.clone();
        port_b.attach_tx_handler(Arc::new(move |tm: TxFrame| {
            a.rx_enqueue(RxFrame::new(tm.data));
        }));

        NullCable { port_a, port_b }
    }
}

impl Default for NullCable {
    fn default() -> Self {
        NullCable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::frame::create_request;
    use std::sync::Mutex;

    #[test]
    fn test_tx_without_consumer_is_rejected() {
        let q = NullQueue::new();
        let frame = create_request(0x04, 0, 10, 0x2A, true);
        assert!(!q.tx_enqueue(frame));
    }

    #[test]
    fn test_cable_crossconnects_both_ways() {
        let cable = NullCable::new();
        let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        cable.port_b.attach_rx_handler(Arc::new(move |msg| {
            sink.lock().unwrap().push(msg.addr());
        }));

        let frame = create_request(0x04, 0, 10, 0x2A, true);
        assert!(cable.port_a.tx_enqueue(frame));
        assert_eq!(*seen.lock().unwrap(), vec![0x2A]);

        // the reverse direction has no handler attached
        let frame = create_request(0x04, 0, 10, 0x0B, true);
        assert!(cable.port_b.tx_enqueue(frame));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_cable_frames_survive_crc_check() {
        let cable = NullCable::new();
        let ok = Arc::new(Mutex::new(false));
        let sink = ok.clone();
        cable.port_b.attach_rx_handler(Arc::new(move |msg| {
            *sink.lock().unwrap() = msg.valid;
        }));
        cable
            .port_a
            .tx_enqueue(create_request(0x04, 0, 10, 0x2A, true));
        assert!(*ok.lock().unwrap());
    }
}
