//! BSL protocol implementation.

pub mod bsl;
pub mod crc;

// Re-export common types
pub use bsl::{decode_status, Command, CommandFrame};
