//! Audio module - tone synthesis and audio output
//!
//! This module provides:
//! - Sine tone generation and the packed sample wire format
//! - The sink interface the bit streamer writes to
//! - A cpal-backed sink for real output devices

mod output;
pub mod sink;
mod tone;

pub use output::CpalSink;
pub use sink::{AudioSink, SinkConfig};
pub use tone::{Tone, TonePair};
