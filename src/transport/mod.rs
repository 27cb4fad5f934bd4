//! # Transport Layer
//!
//! A transport owns one communication channel (a UART, or a test double)
//! and moves owned frames across it: requests go in through a TX queue,
//! replies come back through a single attached RX handler.
//!
//! The [`MsgQueue`] trait is the seam between meters/pools and the
//! concrete channel. [`SerialPortQueue`] drives real RS-485/UART hardware
//! with a worker task pair; [`NullQueue`] and [`NullCable`] provide a
//! transport-less loop for tests; [`MockSerialStream`] stands in for the
//! UART stream itself so the worker pair can be exercised without hardware.

pub mod mock;
pub mod null;
pub mod serial;

pub use mock::MockSerialStream;
pub use null::{NullCable, NullQueue};
pub use serial::{PortConfig, SerialPortQueue};

use crate::error::MeterBusError;
use crate::meter::frame::{RxFrame, TxFrame};
use std::sync::Arc;

/// Consumer of inbound frames. The handler takes ownership of each frame;
/// the transport never touches a frame after hand-off.
pub type RxHandler = Arc<dyn Fn(RxFrame) + Send + Sync>;

/// Consumer of outbound frames on a [`NullQueue`].
pub type TxHandler = Arc<dyn Fn(TxFrame) + Send + Sync>;

/// Message-queue surface of a transport.
///
/// At most one request awaiting a reply is on the wire at any time; a frame
/// with `expects_reply = false` does not hold the bus and may go
/// back-to-back with the next one.
pub trait MsgQueue: Send + Sync {
    /// Enqueues an owned request for transmission.
    ///
    /// Returns false when the queue is full or the transport is not
    /// running; the frame is destroyed either way.
    fn tx_enqueue(&self, msg: TxFrame) -> bool;

    /// Attaches the single RX handler. Inbound frames arriving without a
    /// handler are discarded.
    fn attach_rx_handler(&self, f: RxHandler);

    /// Removes the RX handler.
    fn detach_rx_handler(&self);

    /// Starts the transport (spawns worker tasks where applicable).
    fn start(&self) -> Result<(), MeterBusError>;

    /// Stops the transport, cancelling workers and destroying any queued
    /// requests.
    fn stop(&self);

    /// True while the transport accepts and moves frames.
    fn running(&self) -> bool;
}
