//! Sequential cursor over a byte slice, used for signature blobs and other
//! variable-length metadata encodings (ECMA-335 II.23.2).

use crate::{
    file::io::{read_le_at, CilIO},
    metadata::token::Token,
    Result,
};

/// A forward-only parser over a borrowed byte slice.
///
/// Tracks its own position and exposes the compressed integer and token
/// encodings that CLI signatures are built from.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Parser<'a> {
        Parser { data, position: 0 }
    }

    /// Current position within the underlying slice.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// True while at least one more byte can be read.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Look at the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        if !self.has_more_data() {
            return Err(crate::Error::OutOfBounds);
        }

        Ok(self.data[self.position])
    }

    /// Advance the cursor by one byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if already at the end.
    pub fn advance(&mut self) -> Result<()> {
        if !self.has_more_data() {
            return Err(crate::Error::OutOfBounds);
        }

        self.position += 1;
        Ok(())
    }

    /// Read a little-endian value and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if insufficient bytes remain.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at(self.data, &mut self.position)
    }

    /// Read a compressed unsigned integer as defined in ECMA-335 II.23.2.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data
    /// length or [`crate::Error::Malformed`] for an invalid encoding.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            let value = ((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte);
            return Ok(value);
        }

        // 4-byte encoding: 11xxxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            let value = ((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3;
            return Ok(value);
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Read a `TypeDefOrRefOrSpecEncoded` compressed token (II.23.2.8).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid table tag.
    pub fn read_compressed_token(&mut self) -> Result<Token> {
        let compressed_token = self.read_compressed_uint()?;

        let table: u32 = match compressed_token & 0x3 {
            0x0 => 0x0200_0000, // TypeDef
            0x1 => 0x0100_0000, // TypeRef
            0x2 => 0x1B00_0000, // TypeSpec
            _ => {
                return Err(malformed_error!(
                    "Invalid compressed token - {}",
                    compressed_token
                ))
            }
        };

        let table_index = compressed_token >> 2;

        Ok(Token::new(table + table_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_uint() {
        // 1-byte
        let mut parser = Parser::new(&[0x03]);
        assert_eq!(parser.read_compressed_uint().unwrap(), 3);

        let mut parser = Parser::new(&[0x7F]);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x7F);

        // 2-byte
        let mut parser = Parser::new(&[0x80, 0x80]);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x80);

        let mut parser = Parser::new(&[0xBF, 0xFF]);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x3FFF);

        // 4-byte
        let mut parser = Parser::new(&[0xC0, 0x00, 0x40, 0x00]);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x4000);

        let mut parser = Parser::new(&[0xDF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x1FFF_FFFF);

        // invalid prefix
        let mut parser = Parser::new(&[0xE0]);
        assert!(parser.read_compressed_uint().is_err());
    }

    #[test]
    fn compressed_token() {
        // tag 0 -> TypeDef, row 0x12
        let mut parser = Parser::new(&[0x48]);
        let token = parser.read_compressed_token().unwrap();
        assert_eq!(token.value(), 0x0200_0012);

        // tag 1 -> TypeRef, row 1
        let mut parser = Parser::new(&[0x05]);
        let token = parser.read_compressed_token().unwrap();
        assert_eq!(token.value(), 0x0100_0001);

        // tag 2 -> TypeSpec, row 2
        let mut parser = Parser::new(&[0x0A]);
        let token = parser.read_compressed_token().unwrap();
        assert_eq!(token.value(), 0x1B00_0002);

        // tag 3 -> invalid
        let mut parser = Parser::new(&[0x07]);
        assert!(parser.read_compressed_token().is_err());
    }

    #[test]
    fn cursor() {
        let mut parser = Parser::new(&[0x01, 0x02, 0x03]);
        assert_eq!(parser.peek_byte().unwrap(), 0x01);
        assert_eq!(parser.pos(), 0);

        parser.advance().unwrap();
        assert_eq!(parser.peek_byte().unwrap(), 0x02);

        assert_eq!(parser.read_le::<u16>().unwrap(), 0x0302);
        assert!(!parser.has_more_data());
        assert!(parser.peek_byte().is_err());
        assert!(parser.advance().is_err());
    }
}
