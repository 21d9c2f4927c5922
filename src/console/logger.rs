//! Logger implementation for the log crate.

use core::fmt::{self, Display};

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::TinyResult;

pub struct SimpleLogger;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorCode {
    Red = 31,
    Green = 32,
    Yellow = 33,
    Cyan = 36,
    BrightBlack = 90,
}

impl Display for ColorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\u{1B}[{}m", *self as u8)
    }
}

fn level_color(level: Level) -> ColorCode {
    match level {
        Level::Error => ColorCode::Red,
        Level::Warn => ColorCode::Yellow,
        Level::Info => ColorCode::Green,
        Level::Debug => ColorCode::Cyan,
        Level::Trace => ColorCode::BrightBlack,
    }
}

/// Maps the build-time `LOG` value to a level filter. Unknown or missing
/// values disable logging.
pub fn parse_level(value: Option<&str>) -> LevelFilter {
    match value {
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = record.level();
        let file = record.file().unwrap_or("none");
        let line = record.line().unwrap_or(0);
        let color = level_color(level);
        let color_reset = "\u{1B}[0m";

        // [LEVEL file:line] message
        println!(
            "{color}[{level:<5} {file}:{line}] {}{color_reset}",
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: SimpleLogger = SimpleLogger;

/// Initialize the logger.
pub fn init() -> TinyResult<()> {
    println!(
        "Initializing logger with level: {}",
        option_env!("LOG").unwrap_or("off")
    );
    log::set_logger(&LOGGER)
        .map_err(|err| anyhow::anyhow!("Failed to install logger: {err}"))?;
    log::set_max_level(parse_level(option_env!("LOG")));
    Ok(())
}
