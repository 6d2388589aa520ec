//! LRA1 firmware image loading and validation.
//!
//! Update and verify transfers take a firmware binary produced by the
//! vendor toolchain. Those binaries carry the ASCII marker `"i2-ele "` at a
//! fixed offset, which is checked here before any byte goes over the wire
//! so an unrelated file cannot be flashed by accident.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Smallest plausible firmware binary, in bytes.
pub const MIN_SIZE: usize = 4096;

/// Largest firmware binary the module's flash can hold, in bytes.
pub const MAX_SIZE: usize = 120_000;

/// Vendor marker embedded in every LRA1 firmware binary.
pub const SIGNATURE: [u8; 7] = *b"i2-ele ";

/// Offset of [`SIGNATURE`] within the binary.
pub const SIGNATURE_OFFSET: usize = 0xB8;

/// Number of zero bytes written by a parameter-area initialization.
const INIT_SIZE: usize = 512;

/// A validated firmware image ready for transfer.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Load and validate a firmware binary from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        Self::from_bytes(data)
    }

    /// Validate a firmware binary held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() < MIN_SIZE || data.len() > MAX_SIZE {
            return Err(Error::InvalidImage(format!(
                "firmware size {} bytes out of range ({MIN_SIZE}..={MAX_SIZE})",
                data.len()
            )));
        }

        if data[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE.len()] != SIGNATURE {
            return Err(Error::InvalidImage(format!(
                "vendor signature not found at offset {SIGNATURE_OFFSET:#x}"
            )));
        }

        Ok(Self { data })
    }

    /// Build the synthetic image that erases the parameter area.
    ///
    /// Not a firmware binary, so the size and signature checks do not
    /// apply.
    #[must_use]
    pub fn init() -> Self {
        Self {
            data: vec![0u8; INIT_SIZE],
        }
    }

    /// Image length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image holds no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw image bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
