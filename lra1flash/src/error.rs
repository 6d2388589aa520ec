//! Error types for lra1flash.

use std::io;
use thiserror::Error;

/// Result type for lra1flash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for lra1flash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Firmware image failed size or signature validation.
    #[error("Invalid firmware image: {0}")]
    InvalidImage(String),

    /// A response byte did not arrive before its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Response frame header byte mismatch.
    #[error("Malformed response frame: header byte {header:#04x}")]
    MalformedFrame {
        /// The byte received where the frame header was expected.
        header: u8,
    },

    /// Non-zero status code reported by the bootloader.
    ///
    /// The numeric value is part of the device contract and is surfaced to
    /// the operator unchanged.
    #[error("Bootloader reported error code {code} ({code:#06x})")]
    Device {
        /// The raw status code from the response frame.
        code: i32,
    },

    /// The embedding application requested interruption.
    #[error("Operation interrupted")]
    Interrupted,
}

impl Error {
    /// Map the error to the tool's numeric result convention.
    ///
    /// 0 is success (never an error); -1 a file or port that could not be
    /// opened; -2 image validation failure or a response timeout; -3 a
    /// malformed response frame. Device-reported codes pass through
    /// unchanged. Interruption uses the conventional 130.
    #[must_use]
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Io(_) => -1,
            #[cfg(feature = "native")]
            Self::Serial(_) => -1,
            Self::InvalidImage(_) | Self::Timeout(_) => -2,
            Self::MalformedFrame { .. } => -3,
            Self::Device { code } => *code,
            Self::Interrupted => 130,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        let io_err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert_eq!(io_err.status_code(), -1);

        assert_eq!(Error::InvalidImage("too small".into()).status_code(), -2);
        assert_eq!(Error::Timeout("no byte".into()).status_code(), -2);
        assert_eq!(Error::MalformedFrame { header: 0x7F }.status_code(), -3);
        assert_eq!(Error::Interrupted.status_code(), 130);
    }

    #[test]
    fn device_code_passes_through_unchanged() {
        assert_eq!(Error::Device { code: 0x0500 }.status_code(), 0x0500);
        assert_eq!(Error::Device { code: 0x0123 }.status_code(), 0x0123);
    }
}
