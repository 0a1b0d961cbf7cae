use crate::constants::{ADDRESS_HEX_STRING_LEN, HASH_HEX_STRING_LEN};
use alloy_primitives::{Address, B256, U256};
use std::fmt::LowerHex;

pub(crate) fn format_hex(value: impl LowerHex, width: usize) -> String {
    // Add 2 to the width to account for the 0x prefix.
    let s = format!("{:#0width$x}", value, width = width + 2);
    // `s.len() < width` can happen because of the LowerHex implementation
    // for Uint, which just formats 0 into 0x0, ignoring the width.
    if s.len() < width {
        return format!("0x{:0>width$}", &s[2..], width = width);
    }
    s
}

/// Canonical lowercase hex rendering of an address, zero padded.
pub fn hex_address(address: Address) -> String {
    format_hex(address, ADDRESS_HEX_STRING_LEN)
}

/// Canonical lowercase hex rendering of a 32-byte hash, zero padded.
pub fn hex_hash(hash: B256) -> String {
    format_hex(hash, HASH_HEX_STRING_LEN)
}

/// Canonical hex quantity rendering of a 256-bit value, no padding.
pub fn hex_quantity(value: U256) -> String {
    format!("{value:#x}")
}
