//! # emeter-rs - Event-Driven Energy Meter Driver
//!
//! Driver crate for a family of single-phase AC and DC energy-meter
//! modules speaking Modbus-RTU over RS-485/UART at 9600 bps. Many meters
//! can share one or more buses without the application ever blocking on a
//! request/reply round-trip (~70 ms each): requests are queued per port,
//! transmissions are serialized against in-flight replies, and decoded
//! responses are routed back to the owning meter object which updates its
//! state and fires a user callback.
//!
//! ## Features
//!
//! - Modbus-RTU framing with table-driven CRC-16
//! - Register models, metric parsing and command constructors for both
//!   meter families
//! - Per-port TX/RX worker pair enforcing "one unanswered request per bus"
//! - Meter pool dispatching replies by `(port, slave address)`
//! - Periodic polling at the meter or pool level
//! - Ring-buffered time-series collectors with optional sample averaging
//! - Test doubles: simulated meter, null transport, virtual null-modem
//!   cable and a mock serial stream
//!
//! ## Usage
//!
//! ```no_run
//! use emeter_rs::{MeterModel, MeterPool, PortConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), emeter_rs::MeterBusError> {
//!     let pool = MeterPool::new();
//!     pool.add_serial_port(1, PortConfig::new("/dev/ttyUSB0"), Some("barn bus"))?;
//!     pool.add_meter(1, 1, 10, MeterModel::Ac, Some("well pump"));
//!     pool.add_meter(1, 2, 11, MeterModel::Ac, Some("heater"));
//!
//!     pool.attach_callback(Arc::new(|id, _msg| {
//!         println!("meter {id} updated");
//!     }));
//!     pool.set_autopoll(true);
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
//!     Ok(())
//! }
//! ```

pub mod constants;
pub mod error;
pub mod logging;
pub mod meter;
pub mod pool;
pub mod timeseries;
pub mod transport;
pub mod util;

pub use error::MeterBusError;
pub use logging::{init_logger, init_logger_at};
pub use meter::ac::{AcMetrics, AcState};
pub use meter::dc::{DcMetrics, DcState, Shunt};
pub use meter::device::{AcDevice, DcDevice, Meter, RxCallback};
pub use meter::frame::{RxFrame, TxFrame};
pub use meter::sim::{Jitter, SimAcMeter, SimConfig};
pub use meter::{ErrKind, Measure, MeterModel};
pub use pool::{MeterPool, Port};
pub use timeseries::{Averager, RingBuff, TimeSeries, TsContainer};
pub use transport::{MockSerialStream, MsgQueue, NullCable, NullQueue, PortConfig, SerialPortQueue};
