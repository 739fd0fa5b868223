use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::Local;
use env_logger::{Builder, Logger, Target, WriteStyle};
use log::{LevelFilter, Log, Metadata, Record};

use crate::error::LoggerError;

const TIME_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// Console at info and above, log file at debug and above.
pub struct DualLogger {
    console: Logger,
    file: Logger,
}

impl DualLogger {
    pub fn new(log_path: &Path) -> Result<Self, LoggerError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(|source| LoggerError::Open {
                path: log_path.to_path_buf(),
                source,
            })?;

        let console = console_logger();
        let file = formatted(Builder::new())
            .filter_level(LevelFilter::Warn)
            .filter_module("misi_robot_lib", LevelFilter::Debug)
            .filter_module("misi_robot", LevelFilter::Debug)
            .write_style(WriteStyle::Never)
            .target(Target::Pipe(Box::new(file)))
            .build();

        Ok(DualLogger { console, file })
    }

    fn max_level(&self) -> LevelFilter {
        self.console.filter().max(self.file.filter())
    }
}

fn console_logger() -> Logger {
    formatted(Builder::new())
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .target(Target::Stderr)
        .build()
}

fn formatted(mut builder: Builder) -> Builder {
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            Local::now().format(TIME_FORMAT),
            record.level(),
            record.args()
        )
    });
    builder
}

impl Log for DualLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata) || self.file.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        // Each back end applies its own filter.
        self.console.log(record);
        self.file.log(record);
    }

    fn flush(&self) {
        self.console.flush();
        self.file.flush();
    }
}

/// Installs the process logger. Call once, before anything logs.
pub fn init(log_path: &Path) -> Result<(), LoggerError> {
    let logger = DualLogger::new(log_path)?;
    let max_level = logger.max_level();
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);
    log::debug!("Logger initialized, writing to {}", log_path.display());
    Ok(())
}

/// Console-only logger for failures that happen before the output
/// directory, and so the log file, is known to be usable.
pub fn init_console() -> Result<(), LoggerError> {
    let console = console_logger();
    let max_level = console.filter();
    log::set_boxed_logger(Box::new(console))?;
    log::set_max_level(max_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn debug_lines_reach_the_file_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        let logger = DualLogger::new(&path).unwrap();

        let record = Record::builder()
            .level(Level::Debug)
            .target("misi_robot_lib::job_manager")
            .module_path(Some("misi_robot_lib::job_manager"))
            .args(format_args!("Skipping job 3"))
            .build();
        assert!(logger.file.matches(&record));
        assert!(!logger.console.matches(&record));
        logger.log(&record);
        logger.flush();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[DEBUG] - Skipping job 3"));
    }

    #[test]
    fn console_shows_errors_but_not_debug() {
        std::env::remove_var("RUST_LOG");
        let console = console_logger();
        let error = Record::builder()
            .level(Level::Error)
            .target("misi_robot")
            .args(format_args!("Non-existent path entered"))
            .build();
        let debug = Record::builder()
            .level(Level::Debug)
            .target("misi_robot")
            .args(format_args!("Configuration"))
            .build();
        assert!(console.matches(&error));
        assert!(!console.matches(&debug));
    }

    #[test]
    fn dependency_debug_noise_is_filtered() {
        let dir = tempdir().unwrap();
        let logger = DualLogger::new(&dir.path().join("run.log")).unwrap();
        let record = Record::builder()
            .level(Level::Debug)
            .target("reqwest::connect")
            .args(format_args!("connecting"))
            .build();
        assert!(!logger.file.matches(&record));
    }
}
