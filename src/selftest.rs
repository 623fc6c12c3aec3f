//! Single-tone self-test
//!
//! Plays one tone at the start frequency and nothing else, to check that the
//! output device and volume are set up before streaming real data.

use crate::audio::{AudioSink, Tone};
use crate::error::TalkError;

pub struct SelfTest {
    tone: Tone,
}

impl SelfTest {
    pub fn new(frequency: f64, duration: f64, sample_rate: u32) -> Result<Self, TalkError> {
        Ok(Self {
            tone: Tone::new(frequency, duration, sample_rate)?,
        })
    }

    pub fn frames_per_buffer(&self) -> usize {
        self.tone.samples().len()
    }

    /// Play the tone once
    pub fn run<S: AudioSink + ?Sized>(&self, sink: &mut S) -> Result<(), TalkError> {
        log::info!(
            "Self-test: {} Hz for {}s",
            self.tone.frequency(),
            self.tone.duration()
        );
        sink.write(self.tone.sample_buffer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sink::RecordingSink;

    #[test]
    fn test_plays_single_tone() {
        let test = SelfTest::new(2000.0, 1.0, 44100).unwrap();
        let mut sink = RecordingSink::default();

        test.run(&mut sink).unwrap();

        assert_eq!(test.frames_per_buffer(), 44100);
        assert_eq!(sink.writes.len(), 1);
        assert_eq!(sink.writes[0].len(), 44100 * 4);
    }

    #[test]
    fn test_rejects_bad_duration() {
        assert!(matches!(
            SelfTest::new(2000.0, 0.0, 44100),
            Err(TalkError::InvalidParameter(_))
        ));
    }
}
