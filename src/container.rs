//! Compressed-assembly container handling.
//!
//! Assemblies may arrive wrapped in the XALZ container: a 12-byte header
//! (magic, descriptor index, uncompressed length) followed by an LZ4
//! block-compressed PE image. [`AssemblyImage::open`] strips the wrapper when
//! present and otherwise loads the file as a raw PE.

use std::{
    fs,
    io::Read,
    path::Path,
};

use log::debug;

use crate::{file::io::read_le, file::File, Error, Result};

/// Magic of the compressed-assembly container, ASCII "XALZ" read little-endian.
pub const COMPRESSED_DATA_MAGIC: u32 = 0x5A4C_4158;

/// Size of the container header: magic, descriptor index, uncompressed length.
const HEADER_SIZE: usize = 12;

/// One side of a comparison: the PE image plus its on-disk and logical sizes.
///
/// `logical_length` equals `raw_length` unless the image was wrapped in the
/// compressed container, in which case it is the declared uncompressed size.
pub struct AssemblyImage {
    file: File,
    raw_length: u64,
    logical_length: u64,
}

impl AssemblyImage {
    /// Load an assembly image from `path`, transparently unwrapping the
    /// compressed container.
    ///
    /// # Errors
    /// Any failure (unreadable file, truncated header, decompression failure,
    /// invalid PE) is wrapped in [`Error::LoadError`] carrying the path; no
    /// partial image is ever returned.
    pub fn open(path: &Path) -> Result<AssemblyImage> {
        Self::load(path).map_err(|error| Error::LoadError {
            path: path.display().to_string(),
            source: Box::new(error),
        })
    }

    fn load(path: &Path) -> Result<AssemblyImage> {
        let raw_length = fs::metadata(path)?.len();

        if raw_length >= HEADER_SIZE as u64 {
            let mut reader = fs::File::open(path)?;
            let mut header = [0_u8; HEADER_SIZE];
            reader.read_exact(&mut header)?;

            if read_le::<u32>(&header)? == COMPRESSED_DATA_MAGIC {
                return Self::load_compressed(path, reader, &header, raw_length);
            }
        }

        Ok(AssemblyImage {
            file: File::from_file(path)?,
            raw_length,
            logical_length: raw_length,
        })
    }

    fn load_compressed(
        path: &Path,
        mut reader: fs::File,
        header: &[u8; HEADER_SIZE],
        raw_length: u64,
    ) -> Result<AssemblyImage> {
        // header[4..8] is an opaque descriptor index, not needed here
        let logical_length = read_le::<u32>(&header[8..])? as usize;

        debug!("LZ4 compression detected for {}", path.display());

        let mut payload = Vec::with_capacity(raw_length as usize - HEADER_SIZE);
        reader.read_to_end(&mut payload)?;

        let image = lz4_flex::block::decompress(&payload, logical_length)
            .map_err(|error| malformed_error!("LZ4 decompression failed: {}", error))?;

        if image.len() != logical_length {
            return Err(malformed_error!(
                "Decompressed size {} does not match the declared length {}",
                image.len(),
                logical_length
            ));
        }

        Ok(AssemblyImage {
            file: File::from_mem(image)?,
            raw_length,
            logical_length: logical_length as u64,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_mem(data: Vec<u8>) -> Result<AssemblyImage> {
        let raw_length = data.len() as u64;

        Ok(AssemblyImage {
            file: File::from_mem(data)?,
            raw_length,
            logical_length: raw_length,
        })
    }

    /// The loaded PE image.
    #[must_use]
    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    /// Bytes read from disk.
    #[must_use]
    pub fn raw_length(&self) -> u64 {
        self.raw_length
    }

    /// Uncompressed image size.
    #[must_use]
    pub fn logical_length(&self) -> u64 {
        self.logical_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{write_temp, AssemblyBuilder};

    fn wrap(payload: &[u8]) -> Vec<u8> {
        let mut wrapped = Vec::new();
        wrapped.extend_from_slice(&COMPRESSED_DATA_MAGIC.to_le_bytes());
        wrapped.extend_from_slice(&0_u32.to_le_bytes());
        wrapped.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        wrapped.extend_from_slice(&lz4_flex::block::compress(payload));
        wrapped
    }

    #[test]
    fn raw_image() {
        let payload = AssemblyBuilder::new().build();
        let path = write_temp("raw.dll", &payload);

        let image = AssemblyImage::open(&path).unwrap();
        assert_eq!(image.raw_length(), payload.len() as u64);
        assert_eq!(image.logical_length(), payload.len() as u64);
        assert_eq!(image.file().data(), payload.as_slice());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn container_round_trip() {
        let payload = AssemblyBuilder::new().build();
        let wrapped = wrap(&payload);
        let path = write_temp("wrapped.dll", &wrapped);

        let image = AssemblyImage::open(&path).unwrap();
        assert_eq!(image.raw_length(), wrapped.len() as u64);
        assert_eq!(image.logical_length(), payload.len() as u64);
        assert_eq!(image.file().data(), payload.as_slice());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn truncated_container_fails() {
        let payload = AssemblyBuilder::new().build();
        let mut wrapped = wrap(&payload);
        wrapped.truncate(wrapped.len() / 2);
        let path = write_temp("truncated.dll", &wrapped);

        match AssemblyImage::open(&path) {
            Err(Error::LoadError { path: p, .. }) => {
                assert!(p.contains("truncated.dll"));
            }
            Err(other) => panic!("expected LoadError, got {other}"),
            Ok(_) => panic!("expected LoadError"),
        }

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_embeds_path() {
        match AssemblyImage::open(Path::new("/nonexistent/gone.dll")) {
            Err(Error::LoadError { path, .. }) => assert!(path.contains("gone.dll")),
            Err(other) => panic!("expected LoadError, got {other}"),
            Ok(_) => panic!("expected LoadError"),
        }
    }
}
