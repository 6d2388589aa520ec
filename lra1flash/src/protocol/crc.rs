//! CRC-16/CCITT and the additive payload checksum used by the LRA1
//! bootloader.

/// Compute CRC-16/CCITT over a byte slice.
///
/// Polynomial 0x1021, initial register 0xFFFF, bytes processed MSB-first,
/// no bit reflection and no final XOR. An empty input returns the initial
/// value 0xFFFF unchanged.
#[must_use]
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Fold one payload byte into the running 16-bit wrapping checksum.
///
/// The bootloader verifies this sum against the value carried by the
/// finalize command, so it is accumulated over every firmware byte sent
/// and never reset mid-transfer.
#[must_use]
pub fn checksum_add(acc: u16, byte: u8) -> u16 {
    acc.wrapping_add(u16::from(byte))
}
