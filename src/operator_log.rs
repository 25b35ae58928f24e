use std::{
    fs::{File, OpenOptions},
    io,
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Mutex,
};

use anyhow::Context;
use chrono::Utc;
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => anyhow::bail!("unknown log level {other}"),
        }
    }
}

impl Level {
    fn filter(self) -> LevelFilter {
        match self {
            Self::Trace => LevelFilter::TRACE,
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warn => LevelFilter::WARN,
            Self::Error => LevelFilter::ERROR,
        }
    }
}

enum Sink {
    File(File),
    Stderr,
}

struct Logger {
    sink: Mutex<Sink>,
    min_level: Level,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Installs the process logger. With a directory, records are appended to
/// `operator.log` inside it; without one they go to stderr.
pub fn init(log_dir: Option<PathBuf>, min_level: Level) -> anyhow::Result<Option<PathBuf>> {
    let (sink, path) = match log_dir {
        Some(dir) => {
            let file = open_operator_log(&dir)
                .with_context(|| format!("unable to open operator log in {}", dir.display()))?;
            (Sink::File(file), Some(dir.join("operator.log")))
        }
        None => (Sink::Stderr, None),
    };
    let logger = Logger {
        sink: Mutex::new(sink),
        min_level,
    };
    if LOGGER.set(logger).is_err() {
        anyhow::bail!("operator logger already initialized");
    }
    Ok(path)
}

/// Routes the AWS SDK's `tracing` events to stderr.
pub fn init_sdk_tracing(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level.filter())
        .with_target(true)
        .try_init();
}

fn open_operator_log(log_dir: &Path) -> io::Result<File> {
    std::fs::create_dir_all(log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("operator.log"))
}

pub fn log(level: Level, target: &str, message: String) {
    let Some(logger) = LOGGER.get() else {
        return;
    };
    if level < logger.min_level {
        return;
    }
    let Ok(mut sink) = logger.sink.lock() else {
        return;
    };
    let timestamp = Utc::now().to_rfc3339();
    let line = format!("{timestamp} [{level:?}] {target} - {message}");
    match &mut *sink {
        Sink::File(file) => {
            if writeln!(file, "{line}").is_err() {
                let _ = file.flush();
            }
        }
        Sink::Stderr => eprintln!("{line}"),
    }
}

/// One-line rendering of an error and its causes.
pub fn describe_error(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

pub fn trace(target: &str, message: impl AsRef<str>) {
    log(Level::Trace, target, message.as_ref().to_string());
}

pub fn debug(target: &str, message: impl AsRef<str>) {
    log(Level::Debug, target, message.as_ref().to_string());
}

pub fn info(target: &str, message: impl AsRef<str>) {
    log(Level::Info, target, message.as_ref().to_string());
}

pub fn warn(target: &str, message: impl AsRef<str>) {
    log(Level::Warn, target, message.as_ref().to_string());
}

pub fn error(target: &str, message: impl AsRef<str>) {
    log(Level::Error, target, message.as_ref().to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn writes_operator_log_above_min_level() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = init(Some(dir.path().to_path_buf()), Level::Info)?;
        assert_eq!(path, Some(dir.path().join("operator.log")));
        info("tests::writes_operator_log", "workshop created");
        debug("tests::writes_operator_log", "hidden detail");
        let contents = fs::read_to_string(dir.path().join("operator.log"))?;
        assert!(contents.contains("[Info] tests::writes_operator_log - workshop created"));
        assert!(!contents.contains("hidden detail"));
        Ok(())
    }

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!("warning".parse::<Level>().unwrap(), Level::Warn);
        assert!("loud".parse::<Level>().is_err());
    }

    #[test]
    fn describe_error_includes_causes() {
        let err = anyhow::anyhow!("access denied").context("create user demo-1");
        let described = describe_error(err.as_ref());
        assert_eq!(described, "create user demo-1: access denied");
    }
}
