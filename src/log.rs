//! Set-up of the program logger.
//!
//! Messages go to the console (warnings and errors on stderr, everything else on stdout) and,
//! when running a job, to two log files in the output folder. Console output is colourised when
//! writing to a terminal.
use anyhow::{Context, Result};
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use fern::{Dispatch, FormatCallback};
use log::{LevelFilter, Record};
use std::env;
use std::fmt::{Arguments, Display};
use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

/// Set once the logger has been installed
static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// The default log level for the program.
///
/// Used as a fallback if the user hasn't specified something else with the `PSHA_LOG_LEVEL`
/// environment variable or the settings.toml file.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Overrides the log level in the settings file
const LOG_LEVEL_ENV_VAR: &str = "PSHA_LOG_LEVEL";

/// Receives info, debug and trace messages
const LOG_INFO_FILE_NAME: &str = "psha_info.log";

/// Receives warnings and errors
const LOG_ERROR_FILE_NAME: &str = "psha_error.log";

/// Whether the program logger has been initialised
pub fn is_logger_initialised() -> bool {
    LOGGER_INIT.get().is_some()
}

/// Work out which log level to use.
///
/// The environment variable takes precedence over the settings file.
fn resolve_log_level(log_level_from_settings: Option<&str>) -> Result<LevelFilter> {
    let log_level = env::var(LOG_LEVEL_ENV_VAR)
        .ok()
        .or_else(|| log_level_from_settings.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

    LevelFilter::from_str(&log_level).with_context(|| format!("Unknown log level: {log_level}"))
}

/// Create (or truncate) a log file in the given folder
fn open_log_file(dir: &Path, file_name: &str) -> Result<File> {
    let path = dir.join(file_name);
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .with_context(|| format!("Could not create log file: {}", path.display()))
}

/// Console output, split between stdout and stderr
fn console_dispatch(log_level: LevelFilter) -> Dispatch {
    let colours = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);
    let stdout_colour = std::io::stdout().is_terminal();
    let stderr_colour = std::io::stderr().is_terminal();

    Dispatch::new()
        .chain(
            Dispatch::new()
                .filter(|metadata| metadata.level() > LevelFilter::Warn)
                .format(move |out, message, record| {
                    write_log_colour(out, message, record, stdout_colour.then_some(&colours));
                })
                .level(log_level)
                .chain(std::io::stdout()),
        )
        .chain(
            Dispatch::new()
                .format(move |out, message, record| {
                    write_log_colour(out, message, record, stderr_colour.then_some(&colours));
                })
                .level(log_level.min(LevelFilter::Warn))
                .chain(std::io::stderr()),
        )
}

/// Output to the two log files in `dir`.
///
/// The info file always gets at least info-level messages, whatever the console level.
fn file_dispatch(dir: &Path, log_level: LevelFilter) -> Result<Dispatch> {
    let info_file = open_log_file(dir, LOG_INFO_FILE_NAME)?;
    let error_file = open_log_file(dir, LOG_ERROR_FILE_NAME)?;

    Ok(Dispatch::new()
        .chain(
            Dispatch::new()
                .filter(|metadata| metadata.level() > LevelFilter::Warn)
                .format(write_log_plain)
                .level(log_level.max(LevelFilter::Info))
                .chain(info_file),
        )
        .chain(
            Dispatch::new()
                .format(write_log_plain)
                .level(LevelFilter::Warn)
                .chain(error_file),
        ))
}

/// Initialise the program logger.
///
/// The logger can only be set up once per process. Later calls do nothing, so that several jobs
/// (e.g. in tests) can be run from the same process.
///
/// Possible log levels are `off`, `error`, `warn`, `info`, `debug` and `trace`.
///
/// # Arguments
///
/// * `log_level_from_settings`: The log level specified in `settings.toml`
/// * `log_file_path`: Folder in which to write log files, if any
pub fn init(log_level_from_settings: Option<&str>, log_file_path: Option<&Path>) -> Result<()> {
    if is_logger_initialised() {
        return Ok(());
    }

    let log_level = resolve_log_level(log_level_from_settings)?;
    let mut dispatch = Dispatch::new().chain(console_dispatch(log_level));
    if let Some(dir) = log_file_path {
        dispatch = dispatch.chain(file_dispatch(dir, log_level)?);
    }

    // Only fails if another thread installed a logger first, which is then kept
    let _ = dispatch.apply();
    let _ = LOGGER_INIT.set(());

    Ok(())
}

fn write_log<T: Display>(out: FormatCallback, level: T, target: &str, message: &Arguments) {
    let timestamp = Local::now().format("%H:%M:%S");

    out.finish(format_args!("[{timestamp} {level} {target}] {message}"));
}

fn write_log_plain(out: FormatCallback, message: &Arguments, record: &Record) {
    write_log(out, record.level(), record.target(), message);
}

fn write_log_colour(
    out: FormatCallback,
    message: &Arguments,
    record: &Record,
    colours: Option<&ColoredLevelConfig>,
) {
    match colours {
        Some(colours) => write_log(out, colours.color(record.level()), record.target(), message),
        None => write_log_plain(out, message, record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[rstest]
    #[case(None, LevelFilter::Info)]
    #[case(Some("warn"), LevelFilter::Warn)]
    #[case(Some("TRACE"), LevelFilter::Trace)]
    #[case(Some("off"), LevelFilter::Off)]
    fn test_resolve_log_level(#[case] from_settings: Option<&str>, #[case] expected: LevelFilter) {
        // Only meaningful when the environment doesn't override it
        if env::var(LOG_LEVEL_ENV_VAR).is_err() {
            assert_eq!(resolve_log_level(from_settings).unwrap(), expected);
        }
    }

    #[test]
    fn test_resolve_log_level_invalid() {
        if env::var(LOG_LEVEL_ENV_VAR).is_err() {
            assert!(resolve_log_level(Some("loud")).is_err());
        }
    }

    #[test]
    fn test_init_idempotent() {
        let dir = tempdir().unwrap();
        assert!(init(Some("warn"), Some(dir.path())).is_ok());
        assert!(is_logger_initialised());
        assert!(dir.path().join(LOG_ERROR_FILE_NAME).is_file());

        // Calling again does nothing
        assert!(init(Some("info"), None).is_ok());
    }
}
