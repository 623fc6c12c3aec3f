//! Command-line argument handling
//!
//! The only argument is the positional start frequency in hertz.

use crate::error::TalkError;

/// Fallback program name for the usage line when argv[0] is missing
const PROGRAM_NAME: &str = "tonetalk";

/// Parse the start frequency from the full argument list (including argv[0]).
///
/// Anything that is not a strictly positive integer is rejected.
pub fn parse_start_frequency(args: &[String]) -> Result<u32, TalkError> {
    let program = args
        .first()
        .cloned()
        .unwrap_or_else(|| PROGRAM_NAME.to_string());

    let raw = args
        .get(1)
        .ok_or(TalkError::MissingArgument { program })?;

    match raw.parse::<i64>() {
        Ok(freq) if freq > 0 => {
            u32::try_from(freq).map_err(|_| TalkError::BadArgument(raw.clone()))
        }
        _ => Err(TalkError::BadArgument(raw.clone())),
    }
}
