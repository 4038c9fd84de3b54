//! Metadata tokens: a table identifier in the high byte, a 1-based row index
//! in the low three bytes (ECMA-335 II.22).

use std::fmt;

/// A metadata token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    value: u32,
}

impl Token {
    /// Create a token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Token {
        Token { value }
    }

    /// The raw token value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// The table identifier byte.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.value >> 24) as u8
    }

    /// The 1-based row index.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.value & 0x00FF_FFFF
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.value)
    }
}
