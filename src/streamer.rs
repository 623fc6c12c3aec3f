//! Bit streamer
//!
//! Reads bytes one at a time and plays each bit, most significant first, as
//! the matching tone. A trace of the bits goes to a text writer as they are
//! sent, and each byte's line ends with its printable form and value.

use std::io::{ErrorKind, Read, Write};

use crate::audio::{AudioSink, TonePair};
use crate::error::TalkError;

/// Printable ASCII range used for the trace
const PRINTABLE: std::ops::RangeInclusive<u8> = 32..=126;

/// Split a byte into its bits, most significant first
pub fn byte_to_bits(byte: u8) -> [bool; 8] {
    let mut bits = [false; 8];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (byte >> (7 - i)) & 1 == 1;
    }
    bits
}

/// Trace label for a byte: `A (n=65)`, or `(unsafe) (n=0)` outside printable ASCII
pub fn describe_byte(byte: u8) -> String {
    if PRINTABLE.contains(&byte) {
        format!("{} (n={})", byte as char, byte)
    } else {
        format!("(unsafe) (n={})", byte)
    }
}

/// Totals for one streaming run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes: u64,
    pub bits: u64,
}

/// Plays a byte stream as tones, one tone per bit
pub struct BitStreamer {
    tones: TonePair,
    stats: StreamStats,
}

impl BitStreamer {
    pub fn new(tones: TonePair) -> Self {
        Self {
            tones,
            stats: StreamStats::default(),
        }
    }

    pub fn tones(&self) -> &TonePair {
        &self.tones
    }

    /// Nominal throughput, one bit per tone
    pub fn bits_per_second(&self) -> f64 {
        1.0 / self.tones.zero.duration()
    }

    /// Stream `source` until end of input.
    ///
    /// Every bit is written to `sink` before it is echoed to `trace`. The sink
    /// is neither stopped nor closed here; that belongs to whoever opened it.
    pub fn run<R, S, W>(
        &mut self,
        mut source: R,
        sink: &mut S,
        mut trace: W,
    ) -> Result<StreamStats, TalkError>
    where
        R: Read,
        S: AudioSink + ?Sized,
        W: Write,
    {
        log::info!(
            "Streaming at {:.1} bits/s ({} Hz / {} Hz)",
            self.bits_per_second(),
            self.tones.zero.frequency(),
            self.tones.one.frequency()
        );

        while let Some(byte) = read_byte(&mut source)? {
            self.send_byte(byte, sink, &mut trace)?;
        }

        log::info!(
            "End of input: {} bytes, {} bits sent",
            self.stats.bytes,
            self.stats.bits
        );
        Ok(self.stats)
    }

    /// Play the eight tones of one byte and write its trace line
    pub fn send_byte<S, W>(
        &mut self,
        byte: u8,
        sink: &mut S,
        trace: &mut W,
    ) -> Result<(), TalkError>
    where
        S: AudioSink + ?Sized,
        W: Write,
    {
        log::debug!("Sending byte {:#04x}", byte);

        for bit in byte_to_bits(byte) {
            sink.write(self.tones.for_bit(bit).sample_buffer())?;
            write!(trace, "{}", u8::from(bit))?;
            trace.flush()?;
            self.stats.bits += 1;
        }

        writeln!(trace, " {}", describe_byte(byte))?;
        trace.flush()?;
        self.stats.bytes += 1;

        Ok(())
    }
}

/// Read a single byte, `None` at end of input
fn read_byte<R: Read>(source: &mut R) -> Result<Option<u8>, TalkError> {
    let mut buf = [0u8; 1];
    loop {
        match source.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
