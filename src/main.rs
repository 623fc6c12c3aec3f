//! tonetalk - play a byte stream as two-tone audio
//!
//! Bytes are read from standard input, split into bits (most significant
//! first) and each bit is played as one of two sine tones:
//! - bit 0 at the start frequency given on the command line
//! - bit 1 at the start frequency plus 2000 Hz
//!
//! The bits are echoed to standard output as they are played, followed by
//! the byte they spell.
//!
//! Usage: `tonetalk <start_frequency>`

use std::io::{self, Read, Write};
use std::process;

mod audio;
mod cli;
mod error;
mod selftest;
mod settings;
mod streamer;

use audio::{AudioSink, CpalSink, SinkConfig};
use error::TalkError;
use selftest::SelfTest;
use settings::Settings;
use streamer::BitStreamer;

fn main() {
    env_logger::init();
    log::info!("Starting tonetalk");

    let args: Vec<String> = std::env::args().collect();
    let settings = Settings::load();

    let stdin = io::stdin();
    let stdout = io::stdout();
    let result = run(&args, &settings, stdin.lock(), stdout.lock(), CpalSink::open);

    if let Err(e) = result {
        let _ = report_error(&e, &mut io::stdout(), &mut io::stderr());
        process::exit(e.exit_code());
    }
}

/// Print a fatal error once: argument problems on stdout next to the usage
/// text, everything else on stderr
fn report_error<O: Write, E: Write>(
    err: &TalkError,
    out: &mut O,
    errout: &mut E,
) -> io::Result<()> {
    match err {
        TalkError::MissingArgument { .. } | TalkError::BadArgument(_) => writeln!(out, "{}", err),
        _ => writeln!(errout, "{}", err),
    }
}

/// Parse arguments, build the tones, then play `source` through a sink made
/// by `open_sink`.
///
/// Nothing is opened until the argument and tone parameters have been
/// validated. Once opened, the sink is closed on every path; it is only
/// drained and stopped when streaming succeeded.
fn run<R, W, S, F>(
    args: &[String],
    settings: &Settings,
    source: R,
    trace: W,
    open_sink: F,
) -> Result<(), TalkError>
where
    R: Read,
    W: Write,
    S: AudioSink,
    F: FnOnce(&SinkConfig) -> Result<S, TalkError>,
{
    let start_frequency = cli::parse_start_frequency(args)?;

    if settings.self_test {
        let test = SelfTest::new(
            f64::from(start_frequency),
            settings.self_test_duration,
            settings.sample_rate,
        )?;
        let mut sink = open_sink(&settings.sink_config(test.frames_per_buffer()))?;
        let result = test.run(&mut sink);
        return finish(sink, result);
    }

    let mut streamer = BitStreamer::new(settings.tone_pair(start_frequency)?);
    let mut sink = open_sink(&settings.sink_config(streamer.tones().frames_per_buffer()))?;
    let result = streamer.run(source, &mut sink, trace).map(|_| ());
    finish(sink, result)
}

/// Stop (on success) and close the sink, keeping the first error
fn finish<S: AudioSink>(mut sink: S, result: Result<(), TalkError>) -> Result<(), TalkError> {
    let result = result.and_then(|()| sink.stop());
    sink.close();
    result
}
