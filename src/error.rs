//! Error types shared across the crate

use thiserror::Error;

/// Errors that can occur while encoding and playing a byte stream
#[derive(Error, Debug)]
pub enum TalkError {
    #[error("usage: {program} start_freq")]
    MissingArgument { program: String },

    #[error("bad starting frequency, please provide a number in Hz (e.g. 2000)")]
    BadArgument(String),

    #[error("Invalid tone parameter: {0}")]
    InvalidParameter(String),

    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TalkError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}
