//! Sine tone synthesis
//!
//! A tone is a fixed-length run of samples of `127 * sin(2π·i / period)`,
//! where `period = sample_rate / frequency` is measured in samples. Tones are
//! generated once at startup and then replayed as-is, together with their
//! packed wire representation (little-endian `f32` per sample).

use std::f64::consts::PI;

use crate::error::TalkError;

/// Peak amplitude of a generated tone
pub const AMPLITUDE: f64 = 127.0;

/// Size in bytes of one packed sample
pub const BYTES_PER_SAMPLE: usize = 4;

/// Fewest whole periods a tone should contain before it starts to sound
/// like a click rather than a pitch
const MIN_CYCLES: f64 = 4.0;

/// Generate `floor(duration * sample_rate)` samples of a sine at `frequency`.
///
/// The sample count is truncated, not rounded.
pub fn generate(frequency: f64, duration: f64, sample_rate: u32) -> Result<Vec<f64>, TalkError> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return Err(TalkError::InvalidParameter(format!(
            "frequency must be positive, got {}",
            frequency
        )));
    }
    if !(duration.is_finite() && duration > 0.0) {
        return Err(TalkError::InvalidParameter(format!(
            "duration must be positive, got {}",
            duration
        )));
    }
    if sample_rate == 0 {
        return Err(TalkError::InvalidParameter(
            "sample rate must be positive".to_string(),
        ));
    }

    let wave_len = (duration * f64::from(sample_rate)) as usize;
    let period = f64::from(sample_rate) / frequency;

    Ok((0..wave_len)
        .map(|i| (2.0 * PI * i as f64 / period).sin() * AMPLITUDE)
        .collect())
}

/// Pack samples into the sink wire format: one little-endian `f32` each.
pub fn to_sample_buffer(samples: &[f64]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &sample in samples {
        buffer.extend_from_slice(&(sample as f32).to_le_bytes());
    }
    buffer
}

/// Unpack a wire buffer produced by [`to_sample_buffer`]
pub fn from_sample_buffer(buffer: &[u8]) -> Result<Vec<f32>, TalkError> {
    if buffer.len() % BYTES_PER_SAMPLE != 0 {
        return Err(TalkError::InvalidParameter(format!(
            "sample buffer length {} is not a multiple of {}",
            buffer.len(),
            BYTES_PER_SAMPLE
        )));
    }

    Ok(buffer
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// A precomputed sine tone and its packed sample buffer
#[derive(Debug, Clone)]
pub struct Tone {
    frequency: f64,
    duration: f64,
    sample_rate: u32,
    samples: Vec<f64>,
    encoded: Vec<u8>,
}

impl Tone {
    /// Generate a tone of `duration` seconds at `frequency` Hz
    pub fn new(frequency: f64, duration: f64, sample_rate: u32) -> Result<Self, TalkError> {
        let samples = generate(frequency, duration, sample_rate)?;
        let encoded = to_sample_buffer(&samples);

        let tone = Self {
            frequency,
            duration,
            sample_rate,
            samples,
            encoded,
        };

        if frequency >= f64::from(sample_rate) / 2.0 {
            log::warn!(
                "{} Hz is at or above the Nyquist limit for {} Hz sampling",
                frequency,
                sample_rate
            );
        } else if tone.cycles() < MIN_CYCLES {
            log::warn!(
                "{} Hz tone of {}s holds only {:.1} cycles",
                frequency,
                duration,
                tone.cycles()
            );
        }

        Ok(tone)
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Sample amplitudes in playback order
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Packed wire buffer, `samples().len() * 4` bytes
    pub fn sample_buffer(&self) -> &[u8] {
        &self.encoded
    }

    /// Length of one period in samples
    pub fn period(&self) -> f64 {
        f64::from(self.sample_rate) / self.frequency
    }

    /// Number of whole or partial periods in the tone
    pub fn cycles(&self) -> f64 {
        self.samples.len() as f64 / self.period()
    }
}

/// The two tones used to signal a bit: `zero` for 0, `one` for 1
#[derive(Debug, Clone)]
pub struct TonePair {
    pub zero: Tone,
    pub one: Tone,
}

impl TonePair {
    /// Generate both tones with the same duration and sample rate
    pub fn new(
        zero_frequency: f64,
        one_frequency: f64,
        duration: f64,
        sample_rate: u32,
    ) -> Result<Self, TalkError> {
        Ok(Self {
            zero: Tone::new(zero_frequency, duration, sample_rate)?,
            one: Tone::new(one_frequency, duration, sample_rate)?,
        })
    }

    /// Tone for a single bit
    #[inline]
    pub fn for_bit(&self, bit: bool) -> &Tone {
        if bit {
            &self.one
        } else {
            &self.zero
        }
    }

    /// Samples per tone; both tones share the same length
    pub fn frames_per_buffer(&self) -> usize {
        self.zero.samples().len()
    }
}
