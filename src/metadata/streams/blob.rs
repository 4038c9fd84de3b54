//! The `#Blob` heap, ECMA-335 II.24.2.4.

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// The `#Blob` heap: length-prefixed byte runs holding signatures and custom
/// attribute values. Each entry starts with a compressed length, the heap
/// itself starts with a single NUL entry.
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Wrap the raw heap bytes.
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with the
    /// mandatory NUL entry.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { data })
    }

    /// The blob starting at heap offset `index`, without its length prefix.
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds or the declared length
    /// runs past the heap.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index > self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;

        let Some(data_start) = index.checked_add(parser.pos()) else {
            return Err(OutOfBounds);
        };
        let Some(data_end) = data_start.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if data_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[data_start..data_end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00,
            0x03, 0x41, 0x42, 0x43,
            0x00,
            0x80, 0x02, 0xCC, 0xDD,
        ];

        let blob = Blob::from(&data[..]).unwrap();

        assert_eq!(blob.get(1).unwrap(), &[0x41, 0x42, 0x43]);
        assert_eq!(blob.get(5).unwrap(), &[] as &[u8]);
        // two-byte length encoding
        assert_eq!(blob.get(6).unwrap(), &[0xCC, 0xDD]);

        assert!(blob.get(100).is_err());
    }

    #[test]
    fn rejects_truncated_blob() {
        let data = [0x00, 0x05, 0x41];
        let blob = Blob::from(&data[..]).unwrap();
        assert!(blob.get(1).is_err());
    }

    #[test]
    fn rejects_invalid_heap() {
        assert!(Blob::from(&[]).is_err());
        assert!(Blob::from(&[0x01, 0xCC]).is_err());
    }
}
