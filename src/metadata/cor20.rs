//! CLR runtime (Cor20) header parsing, ECMA-335 II.25.3.3.

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// The CLR runtime header, found at the start of the
/// `IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR` data directory.
pub struct Cor20Header {
    /// Size of the header in bytes, always 72.
    pub cb: u32,
    /// Minimum runtime version required to run this image.
    pub major_runtime_version: u16,
    pub minor_runtime_version: u16,
    /// RVA of the metadata root.
    pub meta_data_rva: u32,
    /// Size of the metadata in bytes.
    pub meta_data_size: u32,
    /// Runtime flags.
    pub flags: u32,
    /// `MethodDef` or File token of the entry point, zero for libraries.
    pub entry_point_token: u32,
    /// RVA of the managed resource blob.
    pub resource_rva: u32,
    /// Size of the managed resource blob.
    pub resource_size: u32,
    pub strong_name_signature_rva: u32,
    pub strong_name_signature_size: u32,
}

impl Cor20Header {
    /// Parse the header from the bytes of the CLR data directory.
    ///
    /// # Errors
    /// Returns an error if the data is too short, the declared header size is
    /// not 72, or the metadata directory is absent.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < 72 {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);

        let cb = parser.read_le::<u32>()?;
        if cb != 72 {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;

        let meta_data_rva = parser.read_le::<u32>()?;
        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("Image has no metadata directory"));
        }

        let flags = parser.read_le::<u32>()?;
        let entry_point_token = parser.read_le::<u32>()?;
        let resource_rva = parser.read_le::<u32>()?;
        let resource_size = parser.read_le::<u32>()?;
        let strong_name_signature_rva = parser.read_le::<u32>()?;
        let strong_name_signature_size = parser.read_le::<u32>()?;

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
            resource_rva,
            resource_size,
            strong_name_signature_rva,
            strong_name_signature_size,
        })
    }
}
