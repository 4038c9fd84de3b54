//! Method body header parsing, just enough to measure body sizes,
//! ECMA-335 II.25.4.

use crate::{file::io::read_le, Error::OutOfBounds, Result};

const FORMAT_MASK: u8 = 0x03;
const FORMAT_TINY: u8 = 0x02;
const FORMAT_FAT: u8 = 0x03;

/// Total size in bytes of the method body starting at `data`, header
/// included.
///
/// Tiny bodies encode their code size in the header byte; fat bodies declare
/// a header size in 4-byte units plus a 32-bit code size.
///
/// # Errors
/// Returns an error if the data is too short or the format bits are invalid.
pub fn method_body_size(data: &[u8]) -> Result<u64> {
    let header = read_le::<u8>(data)?;

    match header & FORMAT_MASK {
        FORMAT_TINY => Ok(1 + u64::from(header >> 2)),
        FORMAT_FAT => {
            if data.len() < 12 {
                return Err(OutOfBounds);
            }

            let flags_and_size = read_le::<u16>(data)?;
            let header_size = u64::from(flags_and_size >> 12) * 4;
            let code_size = u64::from(read_le::<u32>(&data[4..])?);

            Ok(header_size + code_size)
        }
        _ => Err(malformed_error!(
            "Invalid method body format - 0x{:02X}",
            header
        )),
    }
}
