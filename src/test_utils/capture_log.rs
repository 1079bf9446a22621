//! Capturing `log` backend for asserting the shipper's own warnings.
//!
//! The logger is process-global, so tests using it should be `#[serial]`.

use std::sync::{Once, OnceLock};

use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

#[derive(Clone, Debug)]
pub struct CapturedLog {
    pub level: Level,
    pub target: String,
    pub message: String,
}

struct CaptureLogger;

static LOGGER: CaptureLogger = CaptureLogger;
static INIT: Once = Once::new();
static LOGS: OnceLock<Mutex<Vec<CapturedLog>>> = OnceLock::new();

fn logs() -> &'static Mutex<Vec<CapturedLog>> {
    LOGS.get_or_init(|| Mutex::new(Vec::new()))
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        logs().lock().push(CapturedLog {
            level: record.level(),
            target: record.target().to_owned(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

/// Install the capturing logger once per process and clear earlier output.
pub fn install_capture_logger() {
    INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
    clear_logs();
}

/// Drain everything captured so far.
pub fn take_logs() -> Vec<CapturedLog> {
    logs().lock().drain(..).collect()
}

pub fn clear_logs() {
    logs().lock().clear();
}
