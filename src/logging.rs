use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// Logging capability handed to each component at construction.
pub trait SsdpLogger: Send + Sync {
    fn log(&self, level: LogLevel, component: &str, msg: &str);
}

/// Discards everything. Used when no logger is supplied.
pub struct NullLogger;

impl NullLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl SsdpLogger for NullLogger {
    fn log(&self, _level: LogLevel, _component: &str, _msg: &str) {}
}

/// Forwards to the `log` facade, using the component name as the target.
pub struct LogFacade;

impl LogFacade {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl SsdpLogger for LogFacade {
    fn log(&self, level: LogLevel, component: &str, msg: &str) {
        log::log!(target: component, log::Level::from(level), "{}", msg);
    }
}

pub(crate) fn default_logger() -> Arc<dyn SsdpLogger> {
    NullLogger::new()
}
