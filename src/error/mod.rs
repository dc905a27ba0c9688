//! Ошибки инициализации: настройки и логирование.
//!
//! Ошибки самой шины живут в крейте `zvon-error` и реэкспортируются
//! отсюда, чтобы пользователю хватало одного импорта.

use thiserror::Error;
pub use zvon_error::{
    BusError, DispatchError, ErrorExt, PatternError, ResultExt, SchedulerError, StackError,
    StatusCode, ZvonResult,
};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Config error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid setting '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },

    #[error("Unknown log format: {0}")]
    UnknownFormat(String),

    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

impl ErrorExt for SettingsError {
    fn status_code(&self) -> StatusCode {
        StatusCode::ConfigError
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl ErrorExt for LoggingError {
    fn status_code(&self) -> StatusCode {
        StatusCode::LoggingError
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что ошибки инициализации заворачиваются в
    /// `StackError` с правильным кодом.
    #[test]
    fn test_init_errors_into_stack() {
        let err: StackError = LoggingError::UnknownFormat("xml".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::LoggingError);
        assert_eq!(err.to_string(), "Unknown log format: xml");

        let err: StackError = SettingsError::Invalid {
            key: "max_children",
            reason: "must be positive".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::ConfigError);
    }
}
