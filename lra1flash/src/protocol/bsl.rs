//! LRA1 BSL command protocol.
//!
//! This module implements the framed command format the LRA1 bootloader
//! (BSL) accepts once the DFU handshake has completed.
//!
//! ## Frame Format
//!
//! All BSL commands use the same frame format (multi-byte fields
//! little-endian):
//!
//! ```text
//! +--------+--------+---------------+--------+
//! | Header | Length |    Payload    | CRC16  |
//! +--------+--------+---------------+--------+
//! | 1 byte | 2 bytes|   variable    | 2 bytes|
//! +--------+--------+---------------+--------+
//! |  0x80  | payload|  op + fields  |  CRC   |
//! +--------+--------+---------------+--------+
//! ```
//!
//! The CRC-16/CCITT is computed over the payload only, never over the
//! header and length bytes. The device recomputes it on receipt; the
//! sender does not re-validate its own frames.

use crate::error::{Error, Result};
use crate::protocol::crc::crc16_ccitt;
use byteorder::{LittleEndian, WriteBytesExt};

/// Frame header byte, also expected at index 1 of every response.
pub const BSL_HEADER: u8 = 0x80;

/// The link always runs at this rate; the BSL does not negotiate baud.
pub const DEFAULT_BAUD: u32 = 115200;

/// Maximum number of firmware bytes carried by one data block.
pub const BLOCK_SIZE: usize = 256;

/// Fixed length of a command response frame.
pub const RESPONSE_LEN: usize = 8;

/// Probe byte sent while waiting for the bootloader.
pub const DFU_PROBE: u8 = 0xAA;

/// Reply the bootloader gives to a probe byte.
pub const DFU_PROBE_ACK: u8 = 0x55;

/// Magic token confirming the DFU handshake.
pub const DFU_MAGIC: &[u8; 6] = b"i2LoRa";

/// Reply the bootloader gives to the magic token when it is ready.
pub const DFU_CONFIRM_ACK: u8 = 0xAA;

/// BSL command opcodes (first payload byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Receive a data block and write it to flash (0x10).
    WriteBlock = 0x10,
    /// Receive a data block and compare it against flash (0x12).
    VerifyBlock = 0x12,
    /// Load the program counter and start the firmware (0x17).
    LoadPc = 0x17,
    /// Receive a data block in fast mode (0x1B). Part of the bootloader
    /// vocabulary but not issued by any transfer mode.
    FastWriteBlock = 0x1B,
}

/// BSL command frame builder.
#[derive(Debug)]
pub struct CommandFrame {
    cmd: Command,
    payload: Vec<u8>,
}

impl CommandFrame {
    /// Build a data block payload.
    ///
    /// Layout: `[opcode][addr_lo][addr_mid][addr_hi][data...]` with the
    /// 24-bit target flash address little-endian. `data` must not exceed
    /// [`BLOCK_SIZE`] bytes.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn block(cmd: Command, addr: u32, data: &[u8]) -> Self {
        debug_assert!(data.len() <= BLOCK_SIZE);
        let mut payload = Vec::with_capacity(4 + data.len());
        payload.push(cmd as u8);
        payload
            .write_u24::<LittleEndian>(addr & 0x00FF_FFFF)
            .unwrap();
        payload.extend_from_slice(data);
        Self { cmd, payload }
    }

    /// Build the finalize payload.
    ///
    /// Layout: `[0x17][0x00][checksum_lo][checksum_hi]`. The second byte is
    /// a reserved field the bootloader expects to be zero.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn load_pc(checksum: u16) -> Self {
        let mut payload = vec![Command::LoadPc as u8, 0x00];
        payload.write_u16::<LittleEndian>(checksum).unwrap();
        Self {
            cmd: Command::LoadPc,
            payload,
        }
    }

    /// Build the complete frame data.
    #[allow(clippy::cast_possible_truncation)] // payload is at most BLOCK_SIZE + 4 bytes
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn build(&self) -> Vec<u8> {
        // Total length = Header(1) + Len(2) + Payload + CRC(2)
        let mut buf = Vec::with_capacity(5 + self.payload.len());

        buf.push(BSL_HEADER);
        buf.write_u16::<LittleEndian>(self.payload.len() as u16)
            .unwrap();
        buf.extend_from_slice(&self.payload);

        // CRC over the payload only.
        let crc = crc16_ccitt(&self.payload);
        buf.write_u16::<LittleEndian>(crc).unwrap();

        buf
    }

    /// Get the command opcode.
    #[must_use]
    pub fn command(&self) -> Command {
        self.cmd
    }

    /// Get the raw payload carried by this frame.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Decode the status code from a raw response window.
///
/// Byte 1 must equal [`BSL_HEADER`], otherwise the frame is malformed. The
/// status is byte 0 in the high half, OR'd with byte 5 in the low half when
/// the response is longer than 5 bytes. All other byte positions are
/// reserved by the device and treated as opaque. A status of 0 means
/// success; any other value is a device-reported error code.
pub fn decode_status(resp: &[u8]) -> Result<i32> {
    if resp.len() >= 2 && resp[1] != BSL_HEADER {
        return Err(Error::MalformedFrame { header: resp[1] });
    }

    let mut status = resp.first().map_or(0, |&b| i32::from(b) << 8);
    if resp.len() > 5 {
        status |= i32::from(resp[5]);
    }
    Ok(status)
}
