//! # Serial Port Transport
//!
//! One UART serviced by a pair of worker tasks with a shared ready-to-send
//! token:
//!
//! - the **TX worker** drains a bounded queue of owned request frames. For
//!   a frame that expects a reply it first takes the ready-to-send token
//!   (bounded by the port timeout), so a new request never collides with a
//!   reply still in flight from a previous one. On token timeout the frame
//!   is transmitted anyway, presuming the earlier reply lost.
//! - the **RX worker** gives the token at the top of every loop iteration,
//!   then sleeps on the stream. Each burst of received bytes is wrapped in
//!   an owned [`RxFrame`] and handed to the attached handler exactly once.
//!
//! The token is a binary permit: repeated gives while no sender is waiting
//! collapse into one, so an RX flood cannot grant extra transmissions.
//!
//! Workers are generic over the byte stream so tests can substitute
//! [`MockSerialStream`](crate::transport::MockSerialStream) for the UART.

use crate::constants::{METER_BAUD_RATE, PORT_TIMEOUT_MS, TX_QUEUE_DEPTH};
use crate::error::MeterBusError;
use crate::meter::frame::{RxFrame, TxFrame};
use crate::transport::{MsgQueue, RxHandler};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};

const TAG: &str = "emeter::port";

/// Idle gap that ends a receive burst: ~3.5 character times at 9600 bps.
const FRAME_GAP: Duration = Duration::from_millis(4);

/// Read chunk size; an entire reply fits many times over.
const RX_CHUNK: usize = 64;

/// Serial line configuration for one meter bus.
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Device path, e.g. `/dev/ttyUSB0`
    pub path: String,
    pub baudrate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Bounded wait for the ready-to-send token
    pub timeout: Duration,
}

impl PortConfig {
    /// 9600 8N1, no flow control: the AC meter bus defaults.
    pub fn new(path: impl Into<String>) -> Self {
        PortConfig {
            path: path.into(),
            baudrate: METER_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_millis(PORT_TIMEOUT_MS),
        }
    }

    /// Same line settings with two stop bits, as the DC family requires.
    pub fn dc_bus(path: impl Into<String>) -> Self {
        PortConfig {
            stop_bits: StopBits::Two,
            ..PortConfig::new(path)
        }
    }
}

struct Workers {
    tx: mpsc::Sender<TxFrame>,
    tx_task: JoinHandle<()>,
    rx_task: JoinHandle<()>,
}

/// UART transport with a bounded TX queue and a single RX handler.
pub struct SerialPortQueue {
    cfg: PortConfig,
    rx_handler: Arc<RwLock<Option<RxHandler>>>,
    workers: Mutex<Option<Workers>>,
}

impl SerialPortQueue {
    pub fn new(cfg: PortConfig) -> Self {
        SerialPortQueue {
            cfg,
            rx_handler: Arc::new(RwLock::new(None)),
            workers: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PortConfig {
        &self.cfg
    }

    /// Spawns the worker pair over an already-open byte stream.
    ///
    /// [`start`](MsgQueue::start) opens the configured serial device and
    /// calls this; tests call it directly with a mock stream. Must run
    /// inside a Tokio runtime.
    pub fn start_with_stream<S>(&self, stream: S) -> Result<(), MeterBusError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut slot = self.workers.lock().unwrap();
        if slot.is_some() {
            return Err(MeterBusError::AlreadyRunning);
        }

        let (tx, mut tx_queue) = mpsc::channel::<TxFrame>(TX_QUEUE_DEPTH);
        let rts = Arc::new(Notify::new());
        let (mut reader, mut writer) = tokio::io::split(stream);

        let rts_tx = rts.clone();
        let wait = self.cfg.timeout;
        let tx_task = tokio::spawn(async move {
            while let Some(msg) = tx_queue.recv().await {
                if msg.expects_reply && timeout(wait, rts_tx.notified()).await.is_err() {
                    log::debug!(target: TAG, "ready-to-send window expired, transmitting anyway");
                }
                if let Err(e) = writer.write_all(&msg.data).await {
                    log::warn!(target: TAG, "TX write failed: {e}");
                    continue;
                }
                let _ = writer.flush().await;
                log::debug!(target: TAG, "TX {}", msg.hexdump());
            }
        });

        let handler = self.rx_handler.clone();
        let rx_task = tokio::spawn(async move {
            let mut buf = [0u8; RX_CHUNK];
            loop {
                // ready for the next reply, the TX side may transmit
                rts.notify_one();

                let n = match reader.read(&mut buf).await {
                    Ok(0) => {
                        log::warn!(target: TAG, "serial stream closed");
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        log::warn!(target: TAG, "RX error, dropping input: {e}");
                        continue;
                    }
                };
                let mut raw = buf[..n].to_vec();

                // collect the rest of the burst until the line goes idle
                loop {
                    match timeout(FRAME_GAP, reader.read(&mut buf)).await {
                        Ok(Ok(m)) if m > 0 => raw.extend_from_slice(&buf[..m]),
                        _ => break,
                    }
                }

                let cb = handler.read().unwrap().clone();
                let Some(cb) = cb else {
                    // nobody listening, discard the input
                    continue;
                };
                let msg = RxFrame::new(raw);
                log::debug!(target: TAG, "RX {}", msg.hexdump());
                cb(msg);
            }
        });

        *slot = Some(Workers {
            tx,
            tx_task,
            rx_task,
        });
        Ok(())
    }
}

impl MsgQueue for SerialPortQueue {
    fn tx_enqueue(&self, msg: TxFrame) -> bool {
        let slot = self.workers.lock().unwrap();
        let Some(workers) = slot.as_ref() else {
            log::debug!(target: TAG, "TX rejected, port not running");
            return false;
        };
        match workers.tx.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                log::warn!(target: TAG, "TX queue full, request dropped: {e}");
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
        let stream = tokio_serial::new(&self.cfg.path, self.cfg.baudrate)
            .data_bits(self.cfg.data_bits)
            .parity(self.cfg.parity)
            .stop_bits(self.cfg.stop_bits)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| MeterBusError::SerialPort(e.to_string()))?;
        self.start_with_stream(stream)
    }

    fn stop(&self) {
        let Some(workers) = self.workers.lock().unwrap().take() else {
            return;
        };
        // aborting the TX task drops the queue receiver together with any
        // requests still waiting in it
        workers.tx_task.abort();
        workers.rx_task.abort();
        drop(workers.tx);
        log::debug!(target: TAG, "port stopped, queues drained");
    }

    fn running(&self) -> bool {
        self.workers.lock().unwrap().is_some()
    }
}

impl Drop for SerialPortQueue {
    fn drop(&mut self) {
        self.stop();
    }
}
