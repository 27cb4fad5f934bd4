//! # Modbus-RTU Frame Codec
//!
//! Owned request/response frames and the request constructors shared by
//! both meter families.
//!
//! A request is the fixed 8-byte read/write-single layout: slave address,
//! function code, big-endian register address, big-endian value/count and a
//! trailing little-endian CRC-16. The energy reset and calibration commands
//! use shorter special layouts. A response owns the raw bytes exactly as
//! captured from the wire; `valid` reflects the CRC check and the typed
//! interpretation of the body is left to the family parsers.

use crate::constants::{
    ADDR_BCAST, CAL_ADDR, CAL_MSG_SIZE, CAL_PASSWORD, CMD_CALIBRATE, CMD_RESET_ENERGY,
    ENERGY_RST_MSG_SIZE, GENERIC_MSG_SIZE,
};
use crate::meter::crc;
use crate::util::hex::format_hex_compact;
use bytes::{BufMut, BytesMut};

/// An owned request frame ready for transmission.
///
/// Ownership transfers into the port TX queue on enqueue; the TX worker
/// releases the frame after it reaches the UART FIFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFrame {
    /// Raw frame bytes including the trailing CRC
    pub data: Vec<u8>,
    /// A reply is expected; the TX worker must hold the bus for it
    pub expects_reply: bool,
}

impl TxFrame {
    /// Slave address the request is directed to.
    pub fn addr(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }

    /// Function code of the request.
    pub fn cmd(&self) -> u8 {
        self.data.get(1).copied().unwrap_or(0)
    }

    /// Space-separated hex rendering for packet dump log lines.
    pub fn hexdump(&self) -> String {
        format_hex_compact(&self.data)
    }
}

/// An owned response frame as captured from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    data: Vec<u8>,
    /// CRC-16 over the frame checks out
    pub valid: bool,
}

impl RxFrame {
    /// Wraps raw received bytes, stamping the CRC verdict.
    pub fn new(data: Vec<u8>) -> Self {
        let valid = data.len() >= ENERGY_RST_MSG_SIZE && crc::check(&data);
        RxFrame { data, valid }
    }

    /// Slave address the reply came from.
    pub fn addr(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }

    /// Function code of the reply (top bit set for error replies).
    pub fn cmd(&self) -> u8 {
        self.data.get(1).copied().unwrap_or(0)
    }

    /// Full raw frame, CRC included.
    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload between the function code and the CRC. For register reads the
    /// first body byte is the declared byte count.
    pub fn body(&self) -> &[u8] {
        if self.data.len() <= 4 {
            &[]
        } else {
            &self.data[2..self.data.len() - 2]
        }
    }

    /// Space-separated hex rendering for packet dump log lines.
    pub fn hexdump(&self) -> String {
        format_hex_compact(&self.data)
    }
}

/// Builds a generic 8-byte read/write-single request.
///
/// `reg_addr` and `value` go out big-endian, the CRC little-endian.
/// Requests directed at the broadcast address never expect a reply
/// regardless of `expects_reply` (no device answers there).
pub fn create_request(
    cmd: u8,
    reg_addr: u16,
    value: u16,
    slave_addr: u8,
    expects_reply: bool,
) -> TxFrame {
    let mut buf = BytesMut::with_capacity(GENERIC_MSG_SIZE);
    buf.put_u8(slave_addr);
    buf.put_u8(cmd);
    buf.put_u16(reg_addr);
    buf.put_u16(value);
    let crc = crc::compute(&buf);
    buf.put_u16_le(crc);
    TxFrame {
        data: buf.to_vec(),
        expects_reply: expects_reply && slave_addr != ADDR_BCAST,
    }
}

/// Builds the 4-byte energy reset request.
pub fn energy_reset_request(slave_addr: u8) -> TxFrame {
    let mut buf = BytesMut::with_capacity(ENERGY_RST_MSG_SIZE);
    buf.put_u8(slave_addr);
    buf.put_u8(CMD_RESET_ENERGY);
    let crc = crc::compute(&buf);
    buf.put_u16_le(crc);
    TxFrame {
        data: buf.to_vec(),
        expects_reply: slave_addr != ADDR_BCAST,
    }
}

/// Builds the factory calibration request.
///
/// Restricted command: issued on the catch-all address with the fixed
/// password. The library only constructs it, it never sends one on its own.
pub fn calibrate_request() -> TxFrame {
    let mut buf = BytesMut::with_capacity(CAL_MSG_SIZE);
    buf.put_u8(CAL_ADDR);
    buf.put_u8(CMD_CALIBRATE);
    buf.put_u16(CAL_PASSWORD);
    let crc = crc::compute(&buf);
    buf.put_u16_le(crc);
    TxFrame {
        data: buf.to_vec(),
        expects_reply: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CMD_RIR, CMD_WSR};

    #[test]
    fn test_generic_request_layout() {
        let frame = create_request(CMD_RIR, 0x0000, 0x000A, 0x2A, true);
        assert_eq!(
            frame.data,
            vec![0x2A, 0x04, 0x00, 0x00, 0x00, 0x0A, 0x76, 0x16]
        );
        assert!(frame.expects_reply);
        assert_eq!(frame.addr(), 0x2A);
        assert_eq!(frame.cmd(), CMD_RIR);
    }

    #[test]
    fn test_broadcast_never_expects_reply() {
        let frame = create_request(CMD_WSR, 0x0002, 0x0015, ADDR_BCAST, true);
        assert!(!frame.expects_reply);
    }

    #[test]
    fn test_energy_reset_layout() {
        let frame = energy_reset_request(0x2A);
        assert_eq!(frame.data, vec![0x2A, 0x42, 0x9E, 0xE1]);
        assert!(frame.expects_reply);
        assert!(!energy_reset_request(ADDR_BCAST).expects_reply);
    }

    #[test]
    fn test_calibrate_layout() {
        let frame = calibrate_request();
        assert_eq!(frame.data, vec![0xF8, 0x41, 0x37, 0x21, 0xB7, 0x78]);
    }

    #[test]
    fn test_rx_frame_crc_verdict() {
        let ok = RxFrame::new(vec![0x2A, 0x42, 0x9E, 0xE1]);
        assert!(ok.valid);
        assert_eq!(ok.addr(), 0x2A);
        assert_eq!(ok.cmd(), 0x42);

        let bad = RxFrame::new(vec![0x2A, 0x42, 0x9E, 0xE2]);
        assert!(!bad.valid);

        let short = RxFrame::new(vec![0x2A]);
        assert!(!short.valid);
    }

    #[test]
    fn test_rx_frame_body() {
        let frame = RxFrame::new(vec![0x2A, 0x84, 0x03, 0x73, 0x09]);
        assert!(frame.valid);
        assert_eq!(frame.body(), &[0x03]);

        let echo = RxFrame::new(vec![0x2A, 0x42, 0x9E, 0xE1]);
        assert_eq!(echo.body(), &[] as &[u8]);
    }
}
