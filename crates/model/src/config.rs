use crate::env::{DEFAULT_STATUS_TABLE_NAME, LOG_LEVEL, STATUS_TABLE_NAME};
use std::str::FromStr;

/// Log verbosity names accepted in `LOG_LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warning,
    Error,
    Critical,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => Err(format!("unknown log level {other}")),
        }
    }
}

/// Process configuration, read once at cold start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    pub log_level: LogLevel,
    pub table_name: String,
}

impl GuardConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup. Invalid or missing values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_level: LogLevel = lookup(LOG_LEVEL)
            .and_then(|value| value.parse().ok())
            .unwrap_or_default();

        let table_name: String = lookup(STATUS_TABLE_NAME)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_STATUS_TABLE_NAME.to_string());

        GuardConfig {
            log_level,
            table_name,
        }
    }
}
