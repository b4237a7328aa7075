//! Four-character codes.
//!
//! The native audio engine identifies component types, manufacturers,
//! property selectors and a handful of hardware status codes with 32-bit
//! values built from four ASCII bytes in big-endian order (`'aufx'`,
//! `'what'`, ...). Negative status codes are plain integers.

use std::fmt;

/// Four-character code (FourCC).
///
/// # Example
///
/// ```
/// use aqueduct_utils::FourCharCode;
///
/// const EFFECT: FourCharCode = FourCharCode::new(b"aufx");
/// assert_eq!(EFFECT.as_u32(), 0x6175_6678);
/// assert_eq!(EFFECT.to_string(), "aufx");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCharCode(pub [u8; 4]);

impl FourCharCode {
    /// Create a new FourCharCode from a 4-byte array.
    ///
    /// # Panics
    /// Debug builds will panic if any byte is not ASCII.
    pub const fn new(bytes: &[u8; 4]) -> Self {
        debug_assert!(bytes[0].is_ascii(), "FourCC bytes must be ASCII");
        debug_assert!(bytes[1].is_ascii(), "FourCC bytes must be ASCII");
        debug_assert!(bytes[2].is_ascii(), "FourCC bytes must be ASCII");
        debug_assert!(bytes[3].is_ascii(), "FourCC bytes must be ASCII");
        Self(*bytes)
    }

    /// Rebuild a code from its 32-bit big-endian value.
    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    /// Get the FourCC as a 32-bit value (big-endian).
    pub const fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// True when all four bytes are printable ASCII (space through `~`).
    pub const fn is_printable(&self) -> bool {
        let b = &self.0;
        is_printable_byte(b[0])
            && is_printable_byte(b[1])
            && is_printable_byte(b[2])
            && is_printable_byte(b[3])
    }

    /// Get the FourCC as a string slice, or `"????"` if it is not printable.
    pub fn as_str(&self) -> &str {
        if !self.is_printable() {
            return "????";
        }
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Display for FourCharCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<u32> for FourCharCode {
    fn from(value: u32) -> Self {
        Self::from_u32(value)
    }
}

const fn is_printable_byte(b: u8) -> bool {
    b >= 0x20 && b <= 0x7e
}

/// Pack four bytes into a big-endian `u32` at compile time.
///
/// ```
/// use aqueduct_utils::fourcc::fourcc;
///
/// const OUTPUT: u32 = fourcc(b"auou");
/// assert_eq!(OUTPUT, 0x6175_6f75);
/// ```
#[inline]
pub const fn fourcc(bytes: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*bytes)
}

/// Display adapter for engine status codes.
///
/// Positive codes whose bytes are all printable are rendered as `'what'`;
/// everything else is rendered as a signed decimal. Formatting never
/// allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeDisplay(pub i32);

impl fmt::Display for CodeDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = FourCharCode::from_u32(self.0 as u32);
        if self.0 > 0 && code.is_printable() {
            write!(f, "'{}'", code.as_str())
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_const() {
        const CODE: u32 = fourcc(b"aumx");
        assert_eq!(CODE, FourCharCode::new(b"aumx").as_u32());
    }

    #[test]
    fn test_fourcc_round_trip_value() {
        let code = FourCharCode::new(b"lpcm");
        assert_eq!(FourCharCode::from_u32(code.as_u32()), code);
    }

    #[test]
    fn test_non_printable_as_str() {
        let code = FourCharCode::from_u32(0x0000_07d0);
        assert!(!code.is_printable());
        assert_eq!(code.as_str(), "????");
    }

    #[test]
    fn test_code_display_fourcc() {
        assert_eq!(CodeDisplay(fourcc(b"what") as i32).to_string(), "'what'");
    }

    #[test]
    fn test_code_display_negative() {
        assert_eq!(CodeDisplay(-10863).to_string(), "-10863");
        assert_eq!(CodeDisplay(0).to_string(), "0");
    }

    #[test]
    fn test_code_display_small_positive() {
        // 2000 is a plain integer, not a printable code
        assert_eq!(CodeDisplay(2000).to_string(), "2000");
    }
}
