//! Native string transcoding
//!
//! HID drivers hand back `wchar_t` strings: UTF-32 on Linux and macOS,
//! UTF-16 on Windows. Units that cannot be represented become `?`.

use serde::{Deserialize, Serialize};

/// Replacement for code units that cannot be represented
pub const REPLACEMENT: char = '?';

/// A string as returned by the native driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NativeString {
    /// Already transcoded by the driver binding
    Utf8(String),
    /// Raw wide-character units, optionally NUL terminated
    Wide(Vec<u32>),
}

impl NativeString {
    /// Transcode to UTF-8
    pub fn to_utf8(&self) -> String {
        match self {
            NativeString::Utf8(s) => s.clone(),
            NativeString::Wide(units) => transcode_wide(units),
        }
    }

    /// Build a wide string from a Rust string (UTF-32 units)
    pub fn wide_from_str(s: &str) -> Self {
        NativeString::Wide(s.chars().map(u32::from).collect())
    }
}

impl From<String> for NativeString {
    fn from(s: String) -> Self {
        NativeString::Utf8(s)
    }
}

impl From<&str> for NativeString {
    fn from(s: &str) -> Self {
        NativeString::Utf8(s.to_string())
    }
}

/// Transcode wide-character units to UTF-8
///
/// Stops at the first NUL. Surrogate pairs are combined; lone surrogates and
/// out-of-range values are replaced with [`REPLACEMENT`].
pub fn transcode_wide(units: &[u32]) -> String {
    let mut out = String::with_capacity(units.len());
    let mut iter = units.iter().copied().take_while(|&u| u != 0).peekable();

    while let Some(unit) = iter.next() {
        if (0xD800..=0xDBFF).contains(&unit) {
            match iter.peek() {
                Some(&low) if (0xDC00..=0xDFFF).contains(&low) => {
                    iter.next();
                    let combined = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                    out.push(char::from_u32(combined).unwrap_or(REPLACEMENT));
                }
                _ => out.push(REPLACEMENT),
            }
        } else {
            out.push(char::from_u32(unit).unwrap_or(REPLACEMENT));
        }
    }

    out
}
