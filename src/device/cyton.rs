//! OpenBCI Cyton board with the Daisy module attached, over its USB dongle.
//!
//! The board streams fixed 33-byte packets:
//!
//! ```text
//! 0xA0 | sample id | 8 x 24-bit EXG (big endian, signed) | 6 aux bytes | 0xCn
//! ```
//!
//! With the Daisy attached, odd sample ids carry channels 1-8 and the
//! following even id carries channels 9-16. One output sample is emitted per
//! complete pair, at 125 Hz.

use crate::device::adapter::{AcquisitionDevice, ChannelLayout, DeviceBatch};
use crate::error::{EegSyncError, Result};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Serial speed of the OpenBCI dongle.
pub const BAUD_RATE: u32 = 115_200;

const PACKET_LEN: usize = 33;
const HEADER: u8 = 0xA0;
const CHANNELS_PER_BOARD: usize = 8;

/// Microvolts per count: 4.5 V reference, gain 24, 24-bit signed ADC.
const EXG_SCALE_UV: f64 = 4.5 / 24.0 / 8_388_607.0 * 1_000_000.0;
/// g per count of the LIS3DH accelerometer at +-4 g.
const ACCEL_SCALE_G: f64 = 0.002 / 16.0;

/// Read timeout of the serial link; bounds how long one poll can block.
const READ_TIMEOUT: Duration = Duration::from_millis(2);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const HANDSHAKE_POLL: Duration = Duration::from_millis(10);

/// Byte stream to the board. Any serial port implementation qualifies.
///
/// Reads must time out quickly (`ErrorKind::TimedOut` or `WouldBlock`) when
/// no data is waiting.
pub trait SerialLink: Read + Write + Send {}

impl<T: Read + Write + Send> SerialLink for T {}

type Opener = Box<dyn FnMut() -> Result<Box<dyn SerialLink>> + Send>;

/// One decoded board sample: sample id, 16 EXG values (uV), 3 accel values (g).
#[derive(Debug, Clone, PartialEq)]
pub struct CytonSample {
    pub sample_id: u8,
    pub exg: [f64; 2 * CHANNELS_PER_BOARD],
    pub accel: [f64; 3],
}

#[derive(Debug, Clone)]
struct Packet {
    sample_id: u8,
    exg: [f64; CHANNELS_PER_BOARD],
    accel: Option<[f64; 3]>,
}

/// Incremental packet decoder. Resynchronizes on corrupt input.
#[derive(Debug, Default)]
pub struct CytonDaisyDecoder {
    buffer: Vec<u8>,
    pending: Option<Packet>,
    accel: [f64; 3],
    dropped_bytes: usize,
}

impl CytonDaisyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes discarded while searching for packet boundaries.
    pub fn dropped_bytes(&self) -> usize {
        self.dropped_bytes
    }

    /// Forgets partial packets, e.g. after the stream was restarted.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending = None;
    }

    /// Appends `bytes` and returns every sample completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<CytonSample> {
        self.buffer.extend_from_slice(bytes);
        let mut samples = Vec::new();
        let mut pos = 0;

        while self.buffer.len() - pos >= PACKET_LEN {
            let frame = &self.buffer[pos..pos + PACKET_LEN];
            if frame[0] != HEADER || frame[PACKET_LEN - 1] & 0xF0 != 0xC0 {
                pos += 1;
                self.dropped_bytes += 1;
                continue;
            }
            let packet = parse_packet(frame);
            pos += PACKET_LEN;
            if let Some(sample) = self.pair(packet) {
                samples.push(sample);
            }
        }

        self.buffer.drain(..pos);
        samples
    }

    fn pair(&mut self, packet: Packet) -> Option<CytonSample> {
        if let Some(accel) = packet.accel {
            self.accel = accel;
        }

        if packet.sample_id % 2 == 1 {
            // An unmatched board half is superseded.
            self.pending = Some(packet);
            return None;
        }

        let board = self.pending.take()?;
        if board.sample_id.wrapping_add(1) != packet.sample_id {
            return None;
        }

        let mut exg = [0.0; 2 * CHANNELS_PER_BOARD];
        exg[..CHANNELS_PER_BOARD].copy_from_slice(&board.exg);
        exg[CHANNELS_PER_BOARD..].copy_from_slice(&packet.exg);
        Some(CytonSample {
            sample_id: board.sample_id,
            exg,
            accel: self.accel,
        })
    }
}

fn parse_packet(frame: &[u8]) -> Packet {
    let mut exg = [0.0; CHANNELS_PER_BOARD];
    for (ch, value) in exg.iter_mut().enumerate() {
        let offset = 2 + ch * 3;
        let raw = (i32::from(frame[offset]) << 24)
            | (i32::from(frame[offset + 1]) << 16)
            | (i32::from(frame[offset + 2]) << 8);
        // Arithmetic shift sign-extends the 24-bit value.
        *value = f64::from(raw >> 8) * EXG_SCALE_UV;
    }

    // Footer 0xC0 means the aux bytes hold accelerometer data; all zero
    // means no new reading in this packet.
    let aux = &frame[26..32];
    let accel = (frame[PACKET_LEN - 1] == 0xC0 && aux.iter().any(|&b| b != 0)).then(|| {
        let axis = |i: usize| f64::from(i16::from_be_bytes([aux[2 * i], aux[2 * i + 1]]));
        [
            axis(0) * ACCEL_SCALE_G,
            axis(1) * ACCEL_SCALE_G,
            axis(2) * ACCEL_SCALE_G,
        ]
    });

    Packet {
        sample_id: frame[1],
        exg,
        accel,
    }
}

/// Cyton + Daisy board on a serial port.
pub struct CytonDaisyBoard {
    port_name: String,
    open: Opener,
    port: Option<Box<dyn SerialLink>>,
    decoder: CytonDaisyDecoder,
    layout: ChannelLayout,
    handshake_timeout: Duration,
    streaming: bool,
}

impl CytonDaisyBoard {
    /// Board on `port_name` (e.g. `/dev/ttyUSB0`). Nothing is opened until `prepare`.
    pub fn new(port_name: &str) -> Self {
        let path = port_name.to_string();
        Self::with_opener(port_name, move || {
            let port = serialport::new(path.as_str(), BAUD_RATE)
                .timeout(READ_TIMEOUT)
                .open()
                .map_err(|e| EegSyncError::device(format!("cannot open {}: {}", path, e)))?;
            Ok(Box::new(port) as Box<dyn SerialLink>)
        })
    }

    /// Board reached through a custom link, e.g. a network bridge or a test double.
    pub fn with_opener(
        port_name: &str,
        open: impl FnMut() -> Result<Box<dyn SerialLink>> + Send + 'static,
    ) -> Self {
        Self {
            port_name: port_name.to_string(),
            open: Box::new(open),
            port: None,
            decoder: CytonDaisyDecoder::new(),
            layout: ChannelLayout::cyton_daisy(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
            streaming: false,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialLink>> {
        self.port
            .as_mut()
            .ok_or_else(|| EegSyncError::device("Cyton board: session not prepared"))
    }

    fn send(&mut self, command: &[u8]) -> Result<()> {
        let port = self.port()?;
        port.write_all(command)?;
        port.flush()?;
        Ok(())
    }

    /// Reads whatever is waiting. Returns an empty vector on timeout.
    fn read_available(&mut self) -> Result<Vec<u8>> {
        let port = self.port()?;
        let mut data = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    data.extend_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        break;
                    }
                }
                Err(e) if is_timeout(&e) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(data)
    }

    /// Soft-resets the board and waits for its `$$$` prompt.
    fn handshake(&mut self) -> Result<()> {
        self.send(b"v")?;
        let deadline = Instant::now() + self.handshake_timeout;
        let mut reply = Vec::new();
        loop {
            reply.extend(self.read_available()?);
            let text = String::from_utf8_lossy(&reply);
            if text.contains("$$$") {
                if !text.contains("Daisy") {
                    return Err(EegSyncError::device(format!(
                        "board on {} reported no Daisy module",
                        self.port_name
                    )));
                }
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(EegSyncError::device(format!(
                    "no response from board on {} within {:?}",
                    self.port_name, self.handshake_timeout
                )));
            }
            std::thread::sleep(HANDSHAKE_POLL);
        }
    }

    fn to_batch(&self, samples: &[CytonSample], timestamp: f64) -> Result<DeviceBatch> {
        let mut rows = vec![Vec::with_capacity(samples.len()); self.layout.rows];
        for sample in samples {
            rows[0].push(f64::from(sample.sample_id));
            for (&row, &value) in self.layout.primary.iter().zip(sample.exg.iter()) {
                rows[row].push(value);
            }
            for (&row, &value) in self.layout.auxiliary.iter().zip(sample.accel.iter()) {
                rows[row].push(value);
            }
            rows[self.layout.timestamp].push(timestamp);
        }
        DeviceBatch::from_rows(rows)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn epoch_seconds() -> Result<f64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .map_err(|e| EegSyncError::device(format!("system clock before epoch: {}", e)))
}

impl AcquisitionDevice for CytonDaisyBoard {
    fn prepare(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        self.port = Some((self.open)()?);
        if let Err(e) = self.handshake() {
            self.port = None;
            return Err(e);
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.decoder.reset();
        self.send(b"b")?;
        self.streaming = true;
        Ok(())
    }

    fn poll(&mut self) -> Result<DeviceBatch> {
        if !self.streaming {
            return Ok(DeviceBatch::empty());
        }
        let bytes = self.read_available()?;
        if bytes.is_empty() {
            return Ok(DeviceBatch::empty());
        }
        let samples = self.decoder.feed(&bytes);
        if samples.is_empty() {
            return Ok(DeviceBatch::empty());
        }
        // Host receive time; the board itself carries no clock.
        self.to_batch(&samples, epoch_seconds()?)
    }

    fn stop(&mut self) -> Result<()> {
        if !self.streaming {
            return Ok(());
        }
        self.streaming = false;
        self.send(b"s")
    }

    fn release(&mut self) -> Result<()> {
        self.streaming = false;
        self.port = None;
        Ok(())
    }

    fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    fn name(&self) -> &str {
        "cyton-daisy"
    }
}
