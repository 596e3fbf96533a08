//! General helper utilities.

use primitive_types::U256;

/// ANSI colour codes.
pub mod colors {
    pub const HEADER: &str = "\x1b[95m";
    pub const OKGREEN: &str = "\x1b[92m";
    pub const WARNING: &str = "\x1b[93m";
    pub const FAIL: &str = "\x1b[91m";
    pub const ENDC: &str = "\x1b[0m";
    pub const GRAY: &str = "\x1b[38;5;8m";

    /// Wrap `text` in ANSI colour escape codes (no-op when `add_color` is false).
    pub fn colorize(text: &str, color: &str, add_color: bool) -> String {
        if add_color && !text.is_empty() {
            format!("{color}{text}{ENDC}")
        } else {
            text.to_string()
        }
    }
}

/// Pad a hex value to `len` hex characters.
pub fn padded_hex(value: U256, len: usize) -> String {
    let hex = format!("{value:x}");
    if hex.len() > len {
        "?".repeat(len)
    } else {
        format!("0x{hex:0>len$}")
    }
}

/// A function selector as eight hex digits.
pub fn selector_hex(selector: u32) -> String {
    padded_hex(U256::from(selector), 8)
}
