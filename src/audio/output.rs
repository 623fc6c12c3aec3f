//! Audio output through cpal
//!
//! cpal pulls samples from a callback on its own real-time thread, while the
//! bit streamer wants a blocking `write`. The two are joined by a lock-free
//! SPSC ring buffer sized to one tone:
//! - the callback is the single consumer and pads with silence on underrun
//! - `write` is the single producer and sleeps while the ring is full
//!
//! Because the ring holds at most one tone, a `write` returns only once the
//! previous tone is mostly played, which keeps the printed trace in step with
//! what is audible.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, SupportedStreamConfigRange};
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

use super::sink::{AudioSink, SinkConfig};
use super::tone::{self, AMPLITUDE};
use crate::error::TalkError;

/// How long `write` sleeps when the ring is full
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Wait after the ring drains when the device never reported its latency
const FALLBACK_DRAIN_TAIL: Duration = Duration::from_millis(100);

/// Latest error reported by the backend's error callback
type ErrorSlot = Arc<Mutex<Option<String>>>;

/// Audio the device holds beyond the ring, in microseconds (0 = unknown)
type LatencySlot = Arc<AtomicU64>;

/// Sink that plays sample buffers on an output device
pub struct CpalSink {
    /// The output stream; `None` once closed
    stream: Option<cpal::Stream>,

    /// Producer half of the ring feeding the stream callback
    producer: ringbuf::HeapProd<f32>,

    /// Set by the error callback, surfaced on the next write or stop
    error: ErrorSlot,

    /// Updated by the data callback on every buffer
    latency: LatencySlot,

    sample_rate: u32,
}

impl CpalSink {
    /// Open the configured output device and start the stream
    pub fn open(config: &SinkConfig) -> Result<Self, TalkError> {
        let host = cpal::default_host();
        let device = select_device(&host, config.device_name.as_deref())?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using output device: {}", device_name);

        let default_config = device.default_output_config().map_err(device_error)?;
        log::debug!("Default output config: {:?}", default_config);

        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map(|configs| configs.collect())
            .unwrap_or_default();
        let (channels, sample_format) = choose_layout(
            ranges,
            config.sample_rate,
            (default_config.channels(), default_config.sample_format()),
        );

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        log::info!(
            "Audio config: {} Hz, {} channel(s), {:?}, {} frames per tone",
            config.sample_rate,
            channels,
            sample_format,
            config.frames_per_buffer
        );

        let rb = HeapRb::<f32>::new(config.frames_per_buffer.max(1));
        let (producer, consumer) = rb.split();

        let error: ErrorSlot = Arc::new(Mutex::new(None));
        let latency: LatencySlot = Arc::new(AtomicU64::new(0));
        let callback = Callback {
            consumer,
            gain: config.volume / AMPLITUDE as f32,
            sample_rate: config.sample_rate,
            error: Arc::clone(&error),
            latency: Arc::clone(&latency),
        };

        let stream = match sample_format {
            SampleFormat::F32 => build_stream(&device, &stream_config, callback, |s| s)?,
            SampleFormat::I16 => build_stream(&device, &stream_config, callback, |s| {
                (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
            })?,
            format => {
                return Err(TalkError::AudioDeviceError(format!(
                    "Unsupported format: {:?}",
                    format
                )));
            }
        };

        stream.play().map_err(device_error)?;
        log::info!("Output stream started");

        Ok(Self {
            stream: Some(stream),
            producer,
            error,
            latency,
            sample_rate: config.sample_rate,
        })
    }

    /// Upper bound on the time a full ring takes to play out
    fn drain_timeout(&self) -> Duration {
        let ring_secs = self.producer.capacity().get() as f64 / f64::from(self.sample_rate.max(1));
        Duration::from_secs_f64(ring_secs) + Duration::from_secs(1)
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, buffer: &[u8]) -> Result<(), TalkError> {
        if self.stream.is_none() {
            return Err(TalkError::AudioDeviceError("stream is closed".to_string()));
        }

        let samples = tone::from_sample_buffer(buffer)?;
        queue_blocking(&mut self.producer, &samples, &self.error)
    }

    fn stop(&mut self) -> Result<(), TalkError> {
        let Some(stream) = &self.stream else {
            return Ok(());
        };

        let deadline = Instant::now() + self.drain_timeout();
        while !self.producer.is_empty() {
            if Instant::now() >= deadline {
                log::warn!(
                    "Output stalled with {} samples queued",
                    self.producer.occupied_len()
                );
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        let tail = drain_tail(self.latency.load(Ordering::Relaxed));
        log::debug!("Waiting {:?} for the device buffer to play out", tail);
        thread::sleep(tail);

        stream.pause().map_err(device_error)?;
        log::info!("Output stream stopped");

        take_error(&self.error)
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Output device closed");
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Return the latched backend error, if any, clearing the slot
fn take_error(error: &ErrorSlot) -> Result<(), TalkError> {
    let reported = error.lock().ok().and_then(|mut slot| slot.take());
    match reported {
        Some(message) => Err(TalkError::AudioDeviceError(message)),
        None => Ok(()),
    }
}

/// Push all of `samples` into the ring, sleeping while it is full.
///
/// Returns once the last sample is queued, or as soon as the backend
/// reports an error.
fn queue_blocking(
    producer: &mut ringbuf::HeapProd<f32>,
    samples: &[f32],
    error: &ErrorSlot,
) -> Result<(), TalkError> {
    take_error(error)?;

    let mut offset = 0;
    while offset < samples.len() {
        offset += producer.push_slice(&samples[offset..]);
        if offset < samples.len() {
            thread::sleep(POLL_INTERVAL);
            take_error(error)?;
        }
    }

    Ok(())
}

/// Audio still ahead of the speaker when a callback runs: the distance to its
/// playback timestamp plus the buffer it is filling
fn device_latency(ahead: Option<Duration>, frames: usize, sample_rate: u32) -> Duration {
    let buffer = Duration::from_secs_f64(frames as f64 / f64::from(sample_rate.max(1)));
    ahead.unwrap_or_default() + buffer
}

/// How long to keep the stream running once the ring is empty
fn drain_tail(latency_us: u64) -> Duration {
    if latency_us == 0 {
        FALLBACK_DRAIN_TAIL
    } else {
        Duration::from_micros(latency_us) + POLL_INTERVAL
    }
}

/// Pick channel count and sample format.
///
/// A mono layout at `sample_rate` wins, in the default format when the
/// device offers it there, else F32, else I16. Otherwise the default layout
/// is used and each sample is copied to every channel.
fn choose_layout<I>(
    ranges: I,
    sample_rate: u32,
    default: (u16, SampleFormat),
) -> (u16, SampleFormat)
where
    I: IntoIterator<Item = SupportedStreamConfigRange>,
{
    let mono: Vec<SampleFormat> = ranges
        .into_iter()
        .filter(|c| {
            c.channels() == 1
                && c.min_sample_rate().0 <= sample_rate
                && sample_rate <= c.max_sample_rate().0
        })
        .map(|c| c.sample_format())
        .collect();

    [default.1, SampleFormat::F32, SampleFormat::I16]
        .into_iter()
        .filter(|f| matches!(f, SampleFormat::F32 | SampleFormat::I16))
        .find(|f| mono.contains(f))
        .map(|f| (1, f))
        .unwrap_or(default)
}

/// Find the named output device, or the host default
fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, TalkError> {
    match name {
        Some(wanted) => {
            let mut devices = host.output_devices().map_err(device_error)?;
            devices
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| {
                    TalkError::AudioDeviceError(format!("Device not found: {}", wanted))
                })
        }
        None => host
            .default_output_device()
            .ok_or_else(|| TalkError::AudioDeviceError("No output device found".to_string())),
    }
}

/// State moved into the stream callbacks
struct Callback {
    consumer: ringbuf::HeapCons<f32>,
    gain: f32,
    sample_rate: u32,
    error: ErrorSlot,
    latency: LatencySlot,
}

/// Build an output stream that drains the ring, copying each mono sample
/// to every channel of the frame
fn build_stream<T, F>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    callback: Callback,
    convert: F,
) -> Result<cpal::Stream, TalkError>
where
    T: SizedSample,
    F: Fn(f32) -> T + Send + 'static,
{
    let channels = usize::from(config.channels);
    let Callback {
        mut consumer,
        gain,
        sample_rate,
        error,
        latency,
    } = callback;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
                let ts = info.timestamp();
                let ahead = ts.playback.duration_since(&ts.callback);
                let queued = device_latency(ahead, data.len() / channels, sample_rate);
                latency.store(queued.as_micros() as u64, Ordering::Relaxed);

                for frame in data.chunks_mut(channels) {
                    let sample = convert(consumer.try_pop().unwrap_or(0.0) * gain);
                    for ch in frame.iter_mut() {
                        *ch = sample;
                    }
                }
            },
            move |err| {
                log::error!("Audio output error: {}", err);
                if let Ok(mut slot) = error.lock() {
                    *slot = Some(err.to_string());
                }
            },
            None,
        )
        .map_err(device_error)
}

fn device_error(err: impl std::fmt::Display) -> TalkError {
    TalkError::AudioDeviceError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn error_slot() -> ErrorSlot {
        Arc::new(Mutex::new(None))
    }

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            cpal::SampleRate(min),
            cpal::SampleRate(max),
            cpal::SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn test_queue_fills_ring() {
        let (mut producer, mut consumer) = HeapRb::<f32>::new(4).split();
        let error = error_slot();

        queue_blocking(&mut producer, &[1.0, 2.0, 3.0, 4.0], &error).unwrap();

        assert!(producer.is_full());
        assert_eq!(consumer.try_pop(), Some(1.0));
    }

    #[test]
    fn test_second_tone_waits_for_first() {
        let (mut producer, mut consumer) = HeapRb::<f32>::new(4).split();
        let error = error_slot();
        let (released_tx, released_rx) = mpsc::channel();

        queue_blocking(&mut producer, &[1.0; 4], &error).unwrap();

        let reader = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            released_tx.send(Instant::now()).unwrap();
            let mut played = Vec::new();
            while played.len() < 8 {
                match consumer.try_pop() {
                    Some(sample) => played.push(sample),
                    None => thread::sleep(Duration::from_millis(1)),
                }
            }
            played
        });

        queue_blocking(&mut producer, &[2.0; 4], &error).unwrap();
        let returned = Instant::now();

        let released = released_rx.recv().unwrap();
        assert!(returned >= released, "second tone queued before the first was played");

        let played = reader.join().unwrap();
        assert_eq!(played, [1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_latched_error_fails_next_write_once() {
        let (mut producer, _consumer) = HeapRb::<f32>::new(4).split();
        let error = error_slot();
        *error.lock().unwrap() = Some("stream invalidated".to_string());

        let err = queue_blocking(&mut producer, &[1.0], &error).unwrap_err();
        assert!(matches!(err, TalkError::AudioDeviceError(ref m) if m == "stream invalidated"));
        assert!(producer.is_empty());

        queue_blocking(&mut producer, &[1.0], &error).unwrap();
        assert_eq!(producer.occupied_len(), 1);
    }

    #[test]
    fn test_error_while_blocked_unblocks_write() {
        let (mut producer, _consumer) = HeapRb::<f32>::new(2).split();
        let error = error_slot();

        let reporter = {
            let error = Arc::clone(&error);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                *error.lock().unwrap() = Some("device unplugged".to_string());
            })
        };

        // Nothing drains the ring, so only the error can end this call
        let result = queue_blocking(&mut producer, &[1.0; 8], &error);
        reporter.join().unwrap();

        assert!(matches!(result, Err(TalkError::AudioDeviceError(_))));
    }

    #[test]
    fn test_take_error_clears_slot() {
        let error = error_slot();
        assert!(take_error(&error).is_ok());

        *error.lock().unwrap() = Some("xrun".to_string());
        assert!(take_error(&error).is_err());
        assert!(take_error(&error).is_ok());
    }

    #[test]
    fn test_device_latency() {
        let latency = device_latency(Some(Duration::from_millis(20)), 480, 48000);
        assert_eq!(latency, Duration::from_millis(30));
        assert_eq!(device_latency(None, 4410, 44100), Duration::from_millis(100));
    }

    #[test]
    fn test_drain_tail_uses_reported_latency() {
        assert_eq!(drain_tail(0), FALLBACK_DRAIN_TAIL);
        assert_eq!(drain_tail(250_000), Duration::from_millis(250) + POLL_INTERVAL);
    }

    #[test]
    fn test_layout_prefers_mono_default_format() {
        let ranges = vec![
            range(2, 8000, 192000, SampleFormat::F32),
            range(1, 8000, 192000, SampleFormat::I16),
            range(1, 8000, 192000, SampleFormat::F32),
        ];
        assert_eq!(
            choose_layout(ranges, 44100, (2, SampleFormat::I16)),
            (1, SampleFormat::I16)
        );
    }

    #[test]
    fn test_layout_takes_mono_format_when_default_differs() {
        let ranges = vec![
            range(2, 8000, 192000, SampleFormat::F32),
            range(1, 8000, 192000, SampleFormat::I16),
        ];
        assert_eq!(
            choose_layout(ranges, 44100, (2, SampleFormat::F32)),
            (1, SampleFormat::I16)
        );
    }

    #[test]
    fn test_layout_falls_back_to_default() {
        let ranges = vec![
            range(2, 8000, 192000, SampleFormat::F32),
            // mono, but not at the requested rate
            range(1, 8000, 22050, SampleFormat::F32),
            // mono at the rate, but a format the sink cannot fill
            range(1, 8000, 192000, SampleFormat::U8),
        ];
        assert_eq!(
            choose_layout(ranges, 44100, (2, SampleFormat::F32)),
            (2, SampleFormat::F32)
        );
        assert_eq!(
            choose_layout(Vec::new(), 44100, (6, SampleFormat::I16)),
            (6, SampleFormat::I16)
        );
    }
}
