//! Metadata root header and stream directory, ECMA-335 II.24.2.

use indexmap::IndexMap;

use crate::{
    file::io::{read_le, read_le_at},
    Error::OutOfBounds,
    Result,
};

/// Magic signature of physical metadata, ASCII "BSJB" read little-endian.
pub const METADATA_MAGIC: u32 = 0x424A_5342;

/// A stream directory entry: name plus position and length of the stream,
/// relative to the metadata root.
pub struct StreamHeader {
    /// Offset of the stream from the start of the metadata.
    pub offset: u32,
    /// Size of the stream in bytes.
    pub size: u32,
    /// Stream name, at most 32 bytes including the terminator.
    pub name: String,
}

impl StreamHeader {
    /// Parse one directory entry from `data`.
    ///
    /// # Errors
    /// Returns an error if the data is too short or the name is not
    /// NUL-terminated within its 32-byte limit.
    pub fn from(data: &[u8]) -> Result<StreamHeader> {
        if data.len() < 9 {
            return Err(OutOfBounds);
        }

        let mut name = String::with_capacity(32);
        let mut terminated = false;
        for counter in 0..std::cmp::min(32, data.len() - 8) {
            let name_char = read_le::<u8>(&data[8 + counter..])?;
            if name_char == 0 {
                terminated = true;
                break;
            }

            name.push(char::from(name_char));
        }

        if !terminated {
            return Err(malformed_error!(
                "Stream name is not terminated - {}",
                name
            ));
        }

        Ok(StreamHeader {
            offset: read_le::<u32>(data)?,
            size: read_le::<u32>(&data[4..])?,
            name,
        })
    }

    /// Length of this entry on disk, the name being NUL-padded to a 4-byte
    /// boundary.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        8 + (((self.name.len() + 1) + 3) & !3)
    }
}

/// The metadata root: version string plus the directory of all streams.
pub struct Root {
    pub major_version: u16,
    pub minor_version: u16,
    /// Runtime version string, e.g. "v4.0.30319".
    pub version: String,
    pub flags: u16,
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parse the metadata root from the full metadata byte range.
    ///
    /// # Errors
    /// Returns an error if the signature does not match, the version string or
    /// a stream header runs past the data, or a stream extent exceeds the
    /// metadata size.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 20 {
            return Err(OutOfBounds);
        }

        let signature = read_le::<u32>(data)?;
        if signature != METADATA_MAGIC {
            return Err(malformed_error!(
                "Metadata signature does not match - 0x{:08X}",
                signature
            ));
        }

        let version_length = read_le::<u32>(&data[12..])? as usize;
        let Some(version_end) = version_length.checked_add(16) else {
            return Err(malformed_error!(
                "Version string length causing integer overflow - {}",
                version_length
            ));
        };
        if version_end + 4 > data.len() {
            return Err(OutOfBounds);
        }

        // NUL-padded to the declared length
        let version = data[16..version_end]
            .iter()
            .take_while(|byte| **byte != 0)
            .map(|byte| char::from(*byte))
            .collect::<String>();

        let flags = read_le::<u16>(&data[version_end..])?;
        let stream_count = read_le::<u16>(&data[version_end + 2..])?;

        let mut stream_headers = Vec::with_capacity(stream_count as usize);
        let mut stream_offset = version_end + 4;
        for _ in 0..stream_count {
            if stream_offset > data.len() {
                return Err(OutOfBounds);
            }

            let header = StreamHeader::from(&data[stream_offset..])?;
            match u32::checked_add(header.offset, header.size) {
                Some(extent) => {
                    if extent as usize > data.len() {
                        return Err(OutOfBounds);
                    }
                }
                None => {
                    return Err(malformed_error!(
                        "Stream offset and size cause integer overflow - {} + {}",
                        header.offset,
                        header.size
                    ))
                }
            }

            stream_offset += header.byte_size();
            stream_headers.push(header);
        }

        Ok(Root {
            major_version: read_le::<u16>(&data[4..])?,
            minor_version: read_le::<u16>(&data[6..])?,
            version,
            flags,
            stream_headers,
        })
    }

    /// Look up a stream by name.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|header| header.name == name)
    }
}

/// Collect the declared size of every metadata stream, keyed by stream name.
///
/// This walk is deliberately lenient: it follows the directory as far as it
/// can and returns an empty map on any structural problem, so that a damaged
/// image still produces a (possibly partial) report instead of an error.
/// Later directory entries overwrite earlier ones that reuse a name.
#[must_use]
pub fn stream_sizes(data: &[u8]) -> IndexMap<String, u32> {
    let mut sizes = IndexMap::new();

    match stream_sizes_walk(data, &mut sizes) {
        Ok(()) => sizes,
        Err(_) => IndexMap::new(),
    }
}

fn stream_sizes_walk(data: &[u8], sizes: &mut IndexMap<String, u32>) -> Result<()> {
    if data.len() < 20 || read_le::<u32>(data)? != METADATA_MAGIC {
        return Ok(());
    }

    let version_length = read_le::<u32>(&data[12..])? as usize;

    let mut offset = version_length
        .checked_add(18)
        .ok_or(OutOfBounds)?;
    let stream_count = read_le_at::<u16>(data, &mut offset)?;

    for _ in 0..stream_count {
        // skip the stream offset field
        offset = offset.checked_add(4).ok_or(OutOfBounds)?;
        let size = read_le_at::<u32>(data, &mut offset)?;

        let name_start = offset;
        let mut length = 0_usize;
        while length < 32 {
            let byte = read_le_at::<u8>(data, &mut offset)?;
            length += 1;

            if byte == 0 {
                break;
            }
        }

        let name = data[name_start..name_start + length - 1]
            .iter()
            .map(|byte| char::from(*byte))
            .collect::<String>();

        offset = name_start + length;
        if length % 4 != 0 {
            offset += 4 - (length % 4);
        }

        sizes.insert(name, size);
    }

    Ok(())
}
