//! # Hex Formatting Utilities
//!
//! Small helpers around the `hex` crate used by frame debug logging and by
//! tests that build wire captures from hex strings.

/// Encode bytes to a lowercase hex string.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Format bytes as "2a 04 00 00" with a space between bytes, the shape used
/// in packet dump log lines.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode a hex string that may contain whitespace separators.
///
/// Panics on invalid input; intended for test captures only.
pub fn hex_to_bytes(s: &str) -> Vec<u8> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(cleaned).expect("invalid hex in test data")
}
