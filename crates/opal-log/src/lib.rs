use chrono::Local;
use log::{Level, Log, Metadata, Record, SetLoggerError};

/// Minimal stdout logger with local timestamps, shared by the demo server
/// and the integration tests.
pub struct OpalLogger {
    level: Level,
}

static LOGGER: OpalLogger = OpalLogger { level: Level::Info };
static DEBUG_LOGGER: OpalLogger = OpalLogger { level: Level::Trace };

impl OpalLogger {
    /// Installs the logger at the given maximum level.
    pub fn init(level: Level) -> Result<(), SetLoggerError> {
        let logger: &'static OpalLogger = if level >= Level::Debug {
            &DEBUG_LOGGER
        } else {
            &LOGGER
        };
        log::set_logger(logger)?;
        log::set_max_level(level.to_level_filter());
        Ok(())
    }
}

impl Log for OpalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = Local::now();
            println!(
                "{} {:5} {}",
                now.format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
