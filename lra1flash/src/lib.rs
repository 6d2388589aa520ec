//! # lra1flash
//!
//! A library for flashing LRA1 LoRa radio modules.
//!
//! This crate implements the BSL bootloader protocol the LRA1 module exposes
//! over its serial link, including:
//!
//! - Firmware image validation (size bounds and signature check)
//! - The DFU handshake that puts the bootloader into receive mode
//! - Framed commands with CRC-16/CCITT integrity checking
//! - The chunked block-transfer loop with its running checksum
//!
//! ## Supported Platforms
//!
//! - **Native** (default): Linux, macOS, Windows via the `serialport` crate
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//!
//! ## Example
//!
//! ```rust,no_run
//! use lra1flash::{FirmwareImage, Lra1Flasher, Mode, NativePort, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = FirmwareImage::from_file("firmware.bin")?;
//!
//!     let port = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 115200))?;
//!     let mut flasher = Lra1Flasher::new(port);
//!
//!     // Wait for the bootloader, then stream the image block by block.
//!     flasher.connect(|| println!("Reset the module now"))?;
//!     flasher.flash(&image, Mode::Update, |sent, total| {
//!         println!("{sent}/{total} bytes");
//!     })?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod error;
pub mod flasher;
pub mod image;
pub mod port;
pub mod protocol;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker polled by long-running library
/// loops (the DFU wait loop and the block-transfer loop).
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). Interrupting a
/// transfer leaves the module's flash state undefined.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn interrupt_requested() -> bool {
    INTERRUPT_CHECKER.get().is_some_and(|checker| checker())
}

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    error::{Error, Result},
    flasher::{FlashConfig, Lra1Flasher, Mode, TransferSession},
    image::FirmwareImage,
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::bsl::{Command, CommandFrame, DEFAULT_BAUD},
};
