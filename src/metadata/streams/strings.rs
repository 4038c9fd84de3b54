//! The `#Strings` heap, ECMA-335 II.24.2.3.

use std::{ffi::CStr, str};

use crate::{Error::OutOfBounds, Result};

/// The `#Strings` heap: NUL-terminated UTF-8 identifier strings, indexed by
/// byte offset from the metadata tables. Offset zero is always the empty
/// string.
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Wrap the raw heap bytes.
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with the
    /// mandatory NUL entry.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #Strings heap is empty"));
        }

        Ok(Strings { data })
    }

    /// The string starting at heap offset `index`.
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds, the string is not
    /// terminated, or it is not valid UTF-8.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index > self.data.len() {
            return Err(OutOfBounds);
        }

        match CStr::from_bytes_until_nul(&self.data[index..]) {
            Ok(result) => result
                .to_str()
                .map_err(|_| malformed_error!("Invalid string at index - {}", index)),
            Err(_) => Err(malformed_error!("Invalid string at index - {}", index)),
        }
    }
}
