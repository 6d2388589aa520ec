//! LRA1 flashing logic.
//!
//! Drives a full session against the LRA1 bootloader over a [`Port`]: the
//! DFU handshake, the block transfer in the selected mode and the finalize
//! command that hands the checksum to the device and starts the firmware.

use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::image::FirmwareImage;
use crate::interrupt_requested;
use crate::port::Port;
use crate::protocol::bsl::{
    Command, CommandFrame, BLOCK_SIZE, DFU_CONFIRM_ACK, DFU_MAGIC, DFU_PROBE, DFU_PROBE_ACK,
    RESPONSE_LEN,
};
use crate::protocol::crc::checksum_add;
use crate::protocol::decode_status;

/// Flash base address of the firmware area.
pub const UPDATE_ADDR: u32 = 0x002000;

/// Flash base address of the parameter area.
pub const INIT_ADDR: u32 = 0x01FE00;

/// How long to wait for each handshake reply byte.
const PROBE_TIMEOUT: Duration = Duration::from_millis(50);

/// How long to wait for each command response byte.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// What a transfer session does with the module's flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Write a firmware binary to the firmware area.
    Update,
    /// Compare a firmware binary against the firmware area.
    Verify,
    /// Zero-fill the parameter area.
    Init,
}

impl Mode {
    /// The block opcode this mode issues.
    #[must_use]
    pub fn opcode(self) -> Command {
        match self {
            Self::Update | Self::Init => Command::WriteBlock,
            Self::Verify => Command::VerifyBlock,
        }
    }

    /// The flash address the first block targets.
    #[must_use]
    pub fn base_addr(self) -> u32 {
        match self {
            Self::Update | Self::Verify => UPDATE_ADDR,
            Self::Init => INIT_ADDR,
        }
    }
}

/// Timing knobs for a flashing session.
#[derive(Debug, Clone)]
pub struct FlashConfig {
    /// Deadline for each handshake reply byte.
    pub probe_timeout: Duration,
    /// Deadline for each command response byte.
    pub response_timeout: Duration,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            probe_timeout: PROBE_TIMEOUT,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }
}

/// Running state of a block transfer.
///
/// Tracks the target address, the position within the image and the
/// additive checksum the finalize command must carry.
#[derive(Debug)]
pub struct TransferSession {
    opcode: Command,
    addr: u32,
    offset: usize,
    total: usize,
    checksum: u16,
}

impl TransferSession {
    /// Start a session for `total` bytes in the given mode.
    #[must_use]
    pub fn new(mode: Mode, total: usize) -> Self {
        Self {
            opcode: mode.opcode(),
            addr: mode.base_addr(),
            offset: 0,
            total,
            checksum: 0,
        }
    }

    /// Opcode every block of this session carries.
    #[must_use]
    pub fn opcode(&self) -> Command {
        self.opcode
    }

    /// Flash address of the next block.
    #[must_use]
    pub fn addr(&self) -> u32 {
        self.addr
    }

    /// Bytes already transferred.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes still to transfer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.total - self.offset
    }

    /// Checksum over the data bytes transferred so far.
    #[must_use]
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Account for an acknowledged block.
    ///
    /// Folds the block's bytes into the checksum and moves the address and
    /// offset forward. Only called after the device confirmed the block, so
    /// a failed block never skews the finalize checksum.
    pub fn advance(&mut self, block: &[u8]) {
        for &byte in block {
            self.checksum = checksum_add(self.checksum, byte);
        }
        self.addr += block.len() as u32;
        self.offset += block.len();
    }
}

/// Flasher for LRA1 radio modules.
pub struct Lra1Flasher<P: Port> {
    port: P,
    config: FlashConfig,
}

impl<P: Port> Lra1Flasher<P> {
    /// Create a flasher with default timing.
    pub fn new(port: P) -> Self {
        Self::with_config(port, FlashConfig::default())
    }

    /// Create a flasher with explicit timing.
    pub fn with_config(port: P, config: FlashConfig) -> Self {
        Self { port, config }
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the flasher and return the port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Close the underlying port.
    pub fn close(&mut self) -> Result<()> {
        self.port.close()
    }

    /// Reset the module by pulsing the DTR line.
    ///
    /// DTR is wired to the module's reset pin on the usual adapter boards.
    /// Held low for 100 ms, then released with a 50 ms settle.
    pub fn reset_dtr(&mut self) -> Result<()> {
        debug!("Resetting module via DTR pulse");
        self.port.set_dtr(false)?;
        thread::sleep(Duration::from_millis(100));
        self.port.set_dtr(true)?;
        thread::sleep(Duration::from_millis(50));
        Ok(())
    }

    /// Reset the module by command, for boards without the DTR wiring.
    ///
    /// Sends a short break to get the interpreter's attention, then an ETX
    /// followed by the `RESET` command.
    pub fn reset_cmd(&mut self) -> Result<()> {
        debug!("Resetting module via RESET command");
        self.port.clear_all()?;
        self.port.send_break(Duration::from_millis(1))?;
        self.port.write_all(b"\x03RESET\r\n")?;
        self.port.flush()?;
        thread::sleep(Duration::from_millis(100));
        Ok(())
    }

    /// Wait for the bootloader and complete the DFU handshake.
    ///
    /// Probes indefinitely until the bootloader answers, the embedding
    /// application requests interruption or the port fails. `on_wait` is
    /// invoked once per call, the first time an attempt goes unanswered,
    /// so the caller can prompt the operator to power-cycle or reset the
    /// module on its own user-facing channel.
    pub fn connect<F: FnMut()>(&mut self, mut on_wait: F) -> Result<()> {
        self.port.clear_input()?;
        let mut notified = false;

        loop {
            if interrupt_requested() {
                return Err(Error::Interrupted);
            }

            self.port.write_all(&[DFU_PROBE])?;
            self.port.flush()?;

            if self.read_byte(self.config.probe_timeout)? == Some(DFU_PROBE_ACK) {
                self.port.write_all(DFU_MAGIC)?;
                self.port.flush()?;

                if self.read_byte(self.config.probe_timeout)? == Some(DFU_CONFIRM_ACK) {
                    debug!("DFU handshake complete");
                    return Ok(());
                }
            }

            if !notified {
                notified = true;
                on_wait();
            }
        }
    }

    /// Transfer a firmware image in the given mode.
    ///
    /// `progress` is called with `(bytes_done, bytes_total)` after every
    /// acknowledged block. Returns the first device-reported error, if
    /// any, with the device's own status code.
    pub fn flash<F: FnMut(usize, usize)>(
        &mut self,
        image: &FirmwareImage,
        mode: Mode,
        progress: F,
    ) -> Result<()> {
        self.transfer(image.as_bytes(), mode, progress)
    }

    fn transfer<F: FnMut(usize, usize)>(
        &mut self,
        data: &[u8],
        mode: Mode,
        mut progress: F,
    ) -> Result<()> {
        let mut session = TransferSession::new(mode, data.len());
        debug!(
            "Transferring {} bytes ({:?}) at {:#08x}",
            data.len(),
            session.opcode(),
            session.addr()
        );

        while session.remaining() > 0 {
            if interrupt_requested() {
                return Err(Error::Interrupted);
            }

            let len = session.remaining().min(BLOCK_SIZE);
            let block = &data[session.offset()..session.offset() + len];

            let frame = CommandFrame::block(session.opcode(), session.addr(), block);
            self.send_command(&frame)?;
            let status = self.read_response(RESPONSE_LEN)?;
            if status != 0 {
                return Err(Error::Device { code: status });
            }

            session.advance(block);
            progress(session.offset(), data.len());
        }

        // Hand the accumulated checksum to the bootloader and start the
        // firmware.
        let frame = CommandFrame::load_pc(session.checksum());
        self.send_command(&frame)?;
        let status = self.read_response(RESPONSE_LEN)?;
        if status != 0 {
            return Err(Error::Device { code: status });
        }

        debug!("Transfer complete, checksum {:#06x}", session.checksum());
        Ok(())
    }

    fn send_command(&mut self, frame: &CommandFrame) -> Result<()> {
        // Stale input would be misread as this command's response.
        self.port.clear_input()?;

        let data = frame.build();
        trace!("-> {:02x?}", data);
        self.port.write_all(&data)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_response(&mut self, len: usize) -> Result<i32> {
        let mut resp = Vec::with_capacity(len);
        for i in 0..len {
            match self.read_byte(self.config.response_timeout)? {
                Some(byte) => resp.push(byte),
                None => {
                    return Err(Error::Timeout(format!(
                        "response byte {i} of {len} did not arrive"
                    )))
                }
            }
        }
        trace!("<- {:02x?}", resp);
        decode_status(&resp)
    }

    /// Read a single byte, polling until `timeout` has elapsed.
    ///
    /// Returns `Ok(None)` on deadline expiry; port-level read timeouts are
    /// treated as poll ticks, any other I/O error is propagated.
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 1];

        loop {
            match self.port.read(&mut buf) {
                Ok(0) => {}
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::bsl::BSL_HEADER;
    use crate::protocol::crc::crc16_ccitt;
    use std::collections::VecDeque;

    /// One scripted reaction of the mock port.
    enum Step {
        Byte(u8),
        Fail(io::ErrorKind),
    }

    /// Scripted in-memory port.
    ///
    /// Reads pop the script one byte at a time; an exhausted script reads
    /// as a timeout, matching a silent serial line.
    struct MockPort {
        script: VecDeque<Step>,
        written: Vec<u8>,
    }

    impl MockPort {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script: script.into(),
                written: Vec::new(),
            }
        }

        fn ok_response() -> Vec<Step> {
            [0x00, BSL_HEADER, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
                .into_iter()
                .map(Step::Byte)
                .collect()
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Step::Byte(b)) => {
                    buf[0] = b;
                    Ok(1)
                }
                Some(Step::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "script exhausted")),
            }
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Port for MockPort {
        fn clear_input(&mut self) -> Result<()> {
            Ok(())
        }

        fn clear_all(&mut self) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "mock"
        }

        fn set_dtr(&mut self, _level: bool) -> Result<()> {
            Ok(())
        }

        fn send_break(&mut self, _duration: Duration) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn fast_config() -> FlashConfig {
        FlashConfig {
            probe_timeout: Duration::from_millis(1),
            response_timeout: Duration::from_millis(1),
        }
    }

    /// Split a raw write capture back into frame payloads.
    fn parse_payloads(mut data: &[u8]) -> Vec<Vec<u8>> {
        let mut payloads = Vec::new();
        while !data.is_empty() {
            assert_eq!(data[0], BSL_HEADER, "frame header");
            let len = u16::from_le_bytes([data[1], data[2]]) as usize;
            let payload = data[3..3 + len].to_vec();
            let crc = u16::from_le_bytes([data[3 + len], data[4 + len]]);
            assert_eq!(crc, crc16_ccitt(&payload), "frame CRC");
            payloads.push(payload);
            data = &data[5 + len..];
        }
        payloads
    }

    #[test]
    fn update_transfer_splits_into_blocks_and_finalizes() {
        let data: Vec<u8> = (0..300).map(|i| (i % 251) as u8).collect();
        let mut script = Vec::new();
        for _ in 0..3 {
            script.extend(MockPort::ok_response());
        }

        let mut flasher = Lra1Flasher::with_config(MockPort::new(script), fast_config());
        let mut reported = Vec::new();
        flasher
            .transfer(&data, Mode::Update, |done, total| {
                reported.push((done, total));
            })
            .unwrap();

        let payloads = parse_payloads(&flasher.port().written);
        assert_eq!(payloads.len(), 3);

        // Full block at the firmware base address.
        assert_eq!(payloads[0][0], 0x10);
        assert_eq!(&payloads[0][1..4], &[0x00, 0x20, 0x00]);
        assert_eq!(&payloads[0][4..], &data[..256]);

        // Tail block 256 bytes further on.
        assert_eq!(payloads[1][0], 0x10);
        assert_eq!(&payloads[1][1..4], &[0x00, 0x21, 0x00]);
        assert_eq!(&payloads[1][4..], &data[256..]);

        // Finalize carries the wrapping sum of the data bytes.
        let sum: u16 = data
            .iter()
            .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
        assert_eq!(payloads[2], vec![0x17, 0x00, sum as u8, (sum >> 8) as u8]);

        assert_eq!(reported, vec![(256, 300), (300, 300)]);
    }

    #[test]
    fn verify_blocks_use_the_verify_opcode() {
        let data = vec![0x55u8; 10];
        let mut script = Vec::new();
        for _ in 0..2 {
            script.extend(MockPort::ok_response());
        }

        let mut flasher = Lra1Flasher::with_config(MockPort::new(script), fast_config());
        flasher.transfer(&data, Mode::Verify, |_, _| {}).unwrap();

        let payloads = parse_payloads(&flasher.port().written);
        assert_eq!(payloads[0][0], 0x12);
        assert_eq!(&payloads[0][1..4], &[0x00, 0x20, 0x00]);
    }

    #[test]
    fn init_writes_zeros_to_the_parameter_area() {
        let image = FirmwareImage::init();
        let mut script = Vec::new();
        for _ in 0..3 {
            script.extend(MockPort::ok_response());
        }

        let mut flasher = Lra1Flasher::with_config(MockPort::new(script), fast_config());
        flasher.flash(&image, Mode::Init, |_, _| {}).unwrap();

        let payloads = parse_payloads(&flasher.port().written);
        assert_eq!(payloads.len(), 3);

        assert_eq!(payloads[0][0], 0x10);
        assert_eq!(&payloads[0][1..4], &[0x00, 0xFE, 0x01]);
        assert!(payloads[0][4..].iter().all(|&b| b == 0));
        assert_eq!(payloads[0].len(), 4 + 256);

        assert_eq!(&payloads[1][1..4], &[0x00, 0xFF, 0x01]);
        assert_eq!(payloads[1].len(), 4 + 256);

        // All-zero data sums to zero.
        assert_eq!(payloads[2], vec![0x17, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn empty_transfer_sends_only_the_finalize_command() {
        let mut flasher =
            Lra1Flasher::with_config(MockPort::new(MockPort::ok_response()), fast_config());
        flasher.transfer(&[], Mode::Update, |_, _| {}).unwrap();

        let payloads = parse_payloads(&flasher.port().written);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0], vec![0x17, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn device_error_aborts_the_transfer() {
        let data = vec![0xAAu8; 600];
        let mut script = MockPort::ok_response();
        script.extend(
            [0x05, BSL_HEADER, 0x00, 0x00, 0x00, 0x23, 0x00, 0x00]
                .into_iter()
                .map(Step::Byte),
        );

        let mut flasher = Lra1Flasher::with_config(MockPort::new(script), fast_config());
        match flasher.transfer(&data, Mode::Update, |_, _| {}) {
            Err(Error::Device { code }) => assert_eq!(code, 0x0523),
            other => panic!("expected Device error, got {other:?}"),
        }

        // The first block was acknowledged, the second refused, no third.
        let payloads = parse_payloads(&flasher.port().written);
        assert_eq!(payloads.len(), 2);
    }

    #[test]
    fn silent_device_is_a_timeout() {
        let mut flasher = Lra1Flasher::with_config(MockPort::new(Vec::new()), fast_config());
        match flasher.transfer(&[0x01], Mode::Update, |_, _| {}) {
            Err(Error::Timeout(_)) => {}
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[test]
    fn bad_response_header_is_malformed() {
        let script = [0x00, 0x7F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
            .into_iter()
            .map(Step::Byte)
            .collect();

        let mut flasher = Lra1Flasher::with_config(MockPort::new(script), fast_config());
        match flasher.transfer(&[0x01], Mode::Update, |_, _| {}) {
            Err(Error::MalformedFrame { header }) => assert_eq!(header, 0x7F),
            other => panic!("expected MalformedFrame, got {other:?}"),
        }
    }

    #[test]
    fn handshake_completes_on_first_attempt() {
        let script = vec![Step::Byte(0x55), Step::Byte(0xAA)];
        let mut flasher = Lra1Flasher::with_config(MockPort::new(script), fast_config());

        let mut waits = 0;
        flasher.connect(|| waits += 1).unwrap();
        assert_eq!(waits, 0);

        // Probe byte, then the magic token.
        let written = &flasher.port().written;
        assert_eq!(written[0], 0xAA);
        assert_eq!(&written[1..7], b"i2LoRa");
    }

    #[test]
    fn handshake_retries_and_notifies_once() {
        // First probe answered wrongly, second confirmed wrongly, third
        // attempt succeeds.
        let script = vec![
            Step::Byte(0x00),
            Step::Byte(0x55),
            Step::Byte(0x00),
            Step::Byte(0x55),
            Step::Byte(0xAA),
        ];
        let mut flasher = Lra1Flasher::with_config(MockPort::new(script), fast_config());

        let mut waits = 0;
        flasher.connect(|| waits += 1).unwrap();
        assert_eq!(waits, 1);
    }

    #[test]
    fn handshake_propagates_port_failure() {
        let script = vec![Step::Fail(io::ErrorKind::BrokenPipe)];
        let mut flasher = Lra1Flasher::with_config(MockPort::new(script), fast_config());

        match flasher.connect(|| {}) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn session_tracks_address_offset_and_checksum() {
        let mut session = TransferSession::new(Mode::Update, 300);
        assert_eq!(session.opcode(), Command::WriteBlock);
        assert_eq!(session.addr(), UPDATE_ADDR);
        assert_eq!(session.remaining(), 300);

        session.advance(&[0xFF; 256]);
        assert_eq!(session.addr(), UPDATE_ADDR + 256);
        assert_eq!(session.offset(), 256);
        assert_eq!(session.remaining(), 44);
        assert_eq!(session.checksum(), (256u32 * 0xFF % 65536) as u16);
    }

    #[test]
    fn mode_mapping() {
        assert_eq!(Mode::Update.opcode(), Command::WriteBlock);
        assert_eq!(Mode::Init.opcode(), Command::WriteBlock);
        assert_eq!(Mode::Verify.opcode(), Command::VerifyBlock);
        assert_eq!(Mode::Update.base_addr(), UPDATE_ADDR);
        assert_eq!(Mode::Verify.base_addr(), UPDATE_ADDR);
        assert_eq!(Mode::Init.base_addr(), INIT_ADDR);
    }
}
