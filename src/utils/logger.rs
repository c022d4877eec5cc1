//! log4rs setup: `app.log` for everything, `audit.log` and `metrics.log` for
//! the telemetry targets, and optionally `dev6.log` for developer traces.

use crate::config::{LoggingSection, StoreConfig};
use crate::errors::DbError;
use crate::query::telemetry::{AUDIT_TARGET, METRICS_TARGET};
use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DEV6_TARGET: &str = "kvdocs::dev6";

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_BYTES: u64 = 10 * 1024 * 1024;

static HANDLE: OnceLock<log4rs::Handle> = OnceLock::new();

fn cfg_err(e: impl std::fmt::Display) -> DbError {
    DbError::Config(format!("logging: {e}"))
}

#[must_use]
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, DbError> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)
        .map_err(cfg_err)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_BYTES)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))
        .map_err(cfg_err)
}

/// Install (or replace) the process-wide logger.
///
/// - `dir`: directory for the log files, current directory when `None`.
/// - `level`: error|warn|info|debug|trace, `info` when `None`.
/// - `retention`: rolled files kept per log, 7 when `None`.
///
/// # Errors
/// `Io` if the directory cannot be created, `Config` if log4rs rejects the setup.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
) -> Result<(), DbError> {
    configure_logging_with_dev(dir, level, retention, false)
}

/// Like [`configure_logging`], additionally persisting `dev6!` lines to
/// `dev6.log` when `enable_dev6` is set.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_logging_with_dev(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    enable_dev6: bool,
) -> Result<(), DbError> {
    let base = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&base)?;
    let keep = u32::try_from(retention.unwrap_or(7)).unwrap_or(u32::MAX);
    let lvl = parse_level(level.unwrap_or("info"));

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)))
        .appender(Appender::builder().build("audit", Box::new(rolling(&base, "audit", keep)?)))
        .appender(Appender::builder().build("metrics", Box::new(rolling(&base, "metrics", keep)?)))
        .logger(Logger::builder().appender("audit").additive(false).build(AUDIT_TARGET, lvl))
        .logger(Logger::builder().appender("metrics").additive(false).build(METRICS_TARGET, lvl));
    builder = if enable_dev6 {
        builder
            .appender(Appender::builder().build("dev6", Box::new(rolling(&base, "dev6", keep)?)))
            .logger(
                Logger::builder().appender("dev6").additive(false).build(DEV6_TARGET, LevelFilter::Trace),
            )
    } else {
        builder.logger(Logger::builder().additive(false).build(DEV6_TARGET, LevelFilter::Off))
    };
    let config = builder.build(Root::builder().appender("app").build(lvl)).map_err(cfg_err)?;

    if let Some(handle) = HANDLE.get() {
        handle.set_config(config);
        return Ok(());
    }
    let handle = log4rs::init_config(config).map_err(cfg_err)?;
    // a concurrent first call may have won; its handle stays authoritative
    let _ = HANDLE.set(handle);
    Ok(())
}

/// Install the logger described by a `[logging]` section.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_section(section: &LoggingSection) -> Result<(), DbError> {
    configure_logging_with_dev(
        section.dir.as_deref(),
        Some(&section.level),
        Some(section.retention),
        section.dev6,
    )
}

/// Configure logging from `KVDOCS_LOG_DIR`, `KVDOCS_LOG_LEVEL`,
/// `KVDOCS_LOG_RETENTION` and `KVDOCS_DEV6`.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env() -> Result<(), DbError> {
    configure_from_lookup(|k| std::env::var(k).ok())
}

/// [`configure_from_env`] with variables read through `lookup`.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<(), DbError> {
    let mut cfg = StoreConfig::default();
    cfg.apply_overrides(lookup);
    configure_section(&cfg.logging)
}
