//! Register word conversions with word/byte order support
//!
//! ABCD notation: A is the most significant byte of a 32-bit value.
//! Devices polled by modlog use [`WordOrder::BigEndian`] (ABCD) throughout;
//! the other orders exist for vendors that swap words or bytes.

use std::fmt;

/// Byte/word order of a 32-bit value spread over two registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WordOrder {
    /// ABCD: high word first, bytes big-endian
    #[default]
    BigEndian,
    /// DCBA
    LittleEndian,
    /// CDAB: low word first
    BigEndianSwap,
    /// BADC
    LittleEndianSwap,
}

impl WordOrder {
    /// Parse the usual notations ("ABCD", "CD-AB", "BE", ...)
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.to_uppercase().replace('-', "");
        match normalized.as_str() {
            "ABCD" | "BE" | "BIG_ENDIAN" | "BIGENDIAN" => Some(Self::BigEndian),
            "DCBA" | "LE" | "LITTLE_ENDIAN" | "LITTLEENDIAN" => Some(Self::LittleEndian),
            "CDAB" => Some(Self::BigEndianSwap),
            "BADC" => Some(Self::LittleEndianSwap),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BigEndian => "ABCD",
            Self::LittleEndian => "DCBA",
            Self::BigEndianSwap => "CDAB",
            Self::LittleEndianSwap => "BADC",
        }
    }
}

impl fmt::Display for WordOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Register <-> Bytes
// ============================================================================

/// Convert 2 registers to the 4 big-endian bytes of the value
pub fn regs_to_bytes_4(regs: &[u16; 2], order: WordOrder) -> [u8; 4] {
    let [h0, h1] = [regs[0].to_be_bytes(), regs[1].to_be_bytes()];

    match order {
        WordOrder::BigEndian => [h0[0], h0[1], h1[0], h1[1]],
        WordOrder::LittleEndian => [h1[1], h1[0], h0[1], h0[0]],
        WordOrder::BigEndianSwap => [h1[0], h1[1], h0[0], h0[1]],
        WordOrder::LittleEndianSwap => [h0[1], h0[0], h1[1], h1[0]],
    }
}

/// Inverse of [`regs_to_bytes_4`]
pub fn bytes_4_to_regs(bytes: [u8; 4], order: WordOrder) -> [u16; 2] {
    let [a, b, c, d] = bytes;
    match order {
        WordOrder::BigEndian => [u16::from_be_bytes([a, b]), u16::from_be_bytes([c, d])],
        WordOrder::LittleEndian => [u16::from_be_bytes([d, c]), u16::from_be_bytes([b, a])],
        WordOrder::BigEndianSwap => [u16::from_be_bytes([c, d]), u16::from_be_bytes([a, b])],
        WordOrder::LittleEndianSwap => [u16::from_be_bytes([b, a]), u16::from_be_bytes([d, c])],
    }
}

// ============================================================================
// Register <-> Numeric
// ============================================================================

pub fn regs_to_f32(regs: &[u16; 2], order: WordOrder) -> f32 {
    f32::from_be_bytes(regs_to_bytes_4(regs, order))
}

pub fn regs_to_i32(regs: &[u16; 2], order: WordOrder) -> i32 {
    i32::from_be_bytes(regs_to_bytes_4(regs, order))
}

pub fn f32_to_regs(value: f32, order: WordOrder) -> [u16; 2] {
    bytes_4_to_regs(value.to_be_bytes(), order)
}

pub fn i32_to_regs(value: i32, order: WordOrder) -> [u16; 2] {
    bytes_4_to_regs(value.to_be_bytes(), order)
}
