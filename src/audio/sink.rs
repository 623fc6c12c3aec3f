//! Audio sink interface
//!
//! The bit streamer only talks to audio hardware through [`AudioSink`], so
//! the device-backed sink and test doubles are interchangeable.

use crate::error::TalkError;

/// Parameters a sink is opened with
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    /// Samples per second, single channel
    pub sample_rate: u32,
    /// Buffering hint: samples in one tone
    pub frames_per_buffer: usize,
    /// Playback gain, applied by the device only
    pub volume: f32,
    /// Output device name; `None` for the host default
    pub device_name: Option<String>,
}

/// Destination for packed sample buffers (see [`super::tone::to_sample_buffer`])
pub trait AudioSink {
    /// Queue one buffer for playback, blocking until it has been accepted
    fn write(&mut self, buffer: &[u8]) -> Result<(), TalkError>;

    /// Let queued audio finish playing, then halt the stream
    fn stop(&mut self) -> Result<(), TalkError>;

    /// Release the device. Calling it more than once is harmless.
    fn close(&mut self);
}

impl<S: AudioSink + ?Sized> AudioSink for &mut S {
    fn write(&mut self, buffer: &[u8]) -> Result<(), TalkError> {
        (**self).write(buffer)
    }

    fn stop(&mut self) -> Result<(), TalkError> {
        (**self).stop()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Sink that records everything it is given
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Set by whoever opens the sink
    pub config: Option<SinkConfig>,
    pub writes: Vec<Vec<u8>>,
    pub stopped: bool,
    pub closed: bool,
    /// Fail the write with this index
    pub fail_on_write: Option<usize>,
}

#[cfg(test)]
impl AudioSink for RecordingSink {
    fn write(&mut self, buffer: &[u8]) -> Result<(), TalkError> {
        if self.closed {
            return Err(TalkError::AudioDeviceError("write after close".to_string()));
        }
        if self.fail_on_write == Some(self.writes.len()) {
            return Err(TalkError::AudioDeviceError("device unplugged".to_string()));
        }
        self.writes.push(buffer.to_vec());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), TalkError> {
        self.stopped = true;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
