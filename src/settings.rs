use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::audio::{SinkConfig, TonePair};
use crate::error::TalkError;

/// Distance in hertz between the bit-0 and bit-1 carriers
pub const TONE_SPACING_HZ: u32 = 2000;

/// Returns the path to the settings file: `~/.config/tonetalk/settings.json`
fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("tonetalk");
    path.push("settings.json");
    path
}

/// Tone and playback settings, fixed for the lifetime of one run.
///
/// Read from JSON in the platform config directory. Fields use
/// `#[serde(default)]` so a partial file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Tone synthesis
    pub sample_rate: u32,
    pub tone_duration: f64,

    // Self-test mode
    pub self_test: bool,
    pub self_test_duration: f64,

    // Audio output
    pub volume: f32,
    pub output_device: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            tone_duration: 0.25,

            self_test: false,
            self_test_duration: 1.0,

            volume: 1.0,
            output_device: None,
        }
    }
}

impl Settings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        let path = settings_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::debug!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Parse settings from a JSON document
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    /// Carrier frequencies for bit 0 and bit 1
    pub fn carrier_frequencies(start_frequency: u32) -> (f64, f64) {
        let f0 = f64::from(start_frequency);
        (f0, f0 + f64::from(TONE_SPACING_HZ))
    }

    /// Build the bit-0/bit-1 tones for a run starting at `start_frequency`
    pub fn tone_pair(&self, start_frequency: u32) -> Result<TonePair, TalkError> {
        let (f0, f1) = Self::carrier_frequencies(start_frequency);
        TonePair::new(f0, f1, self.tone_duration, self.sample_rate)
    }

    /// Sink parameters for tones of `frames_per_buffer` samples
    pub fn sink_config(&self, frames_per_buffer: usize) -> SinkConfig {
        SinkConfig {
            sample_rate: self.sample_rate,
            frames_per_buffer,
            volume: self.volume,
            device_name: self.output_device.clone(),
        }
    }
}
