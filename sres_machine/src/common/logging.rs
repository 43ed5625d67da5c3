//! Utilities for configuring logging
use std::sync::Mutex;
use std::sync::Once;

use colored::*;
use env_logger::Logger;
use log::Level;
use log::Log;
use log::Record;

use crate::common::util::RingBuffer;

static ONCE_INIT: Once = Once::new();

const TRACE_CONTEXT_LINES: usize = 20;

/// Filter used when `SRES_LOG` is not set and verbose test logging is requested.
const VERBOSE_TEST_FILTER: &str = "debug,sres_machine::scheduler=trace";

/// Logger that uses env_logger for configuring filters and implements a custom format.
///
/// The scheduler emits a trace line for every transfer of control, which is far too much to
/// print. Trace lines are kept in a ring buffer instead and printed as context in front of the
/// next line with a higher level.
struct SresLogger {
    trace_logs: Mutex<RingBuffer<String, TRACE_CONTEXT_LINES>>,
    logger: Logger,
}

impl SresLogger {
    pub fn new(logger: Logger) -> Self {
        log::set_max_level(logger.filter());
        Self {
            trace_logs: Mutex::new(RingBuffer::default()),
            logger,
        }
    }

    fn format_record(&self, record: &Record) -> String {
        let target = record.target().rsplit("::").next().unwrap_or_default();
        let message = record.args().to_string();
        match record.level() {
            Level::Error => format!("{} {} {}", "E".red().bold(), target.dimmed(), message.red()),
            Level::Warn => format!(
                "{} {} {}",
                "W".yellow().bold(),
                target.dimmed(),
                message.yellow()
            ),
            Level::Info => format!("{} {} {}", "I".blue().bold(), target.dimmed(), message),
            Level::Debug => format!("{} {} {}", "D".blue(), target.dimmed(), message),
            Level::Trace => format!("{} {}", target.dimmed(), message.dimmed()),
        }
    }
}

impl Log for SresLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.logger.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.logger.matches(record) {
            return;
        }
        let record_str = self.format_record(record);
        let Ok(mut trace_logs) = self.trace_logs.lock() else {
            return;
        };
        if record.level() == Level::Trace {
            trace_logs.push(record_str);
        } else {
            if trace_logs.is_full() {
                println!("{}", "...".dimmed());
            }
            for line in trace_logs.drain_oldest_first() {
                println!("{}", line);
            }
            println!("{}", record_str);
        }
    }

    fn flush(&self) {}
}

fn install(default_filter: &str) {
    let filter_config = std::env::var("SRES_LOG").unwrap_or(default_filter.to_string());
    let filter = env_logger::builder().parse_filters(&filter_config).build();
    // Another logger may already be installed by the embedding application.
    let _ = log::set_boxed_logger(Box::new(SresLogger::new(filter)));
}

pub fn init() {
    ONCE_INIT.call_once(|| install("warn"));
}

pub fn test_init(verbose: bool) {
    ONCE_INIT.call_once(|| install(if verbose { VERBOSE_TEST_FILTER } else { "warn" }));
}
