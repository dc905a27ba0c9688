use std::fmt;

use num_enum::TryFromPrimitive;

/// Коды статуса для категоризации ошибок шины событий.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: События и шаблоны
/// - 3xxx: Каналы и маршрутизация
/// - 4xxx: Диспетчеризация обработчиков
/// - 5xxx: Планировщик
/// - 6xxx: Конфигурация и окружение
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unexpected = 1001,
    Internal = 1002,
    InvalidArgs = 1003,

    // === 2xxx: События и шаблоны ===
    MalformedNotation = 2000,
    UntypedEvent = 2001,
    ExpectedSingleEvent = 2002,

    // === 3xxx: Каналы и маршрутизация ===
    NotFirable = 3000,
    InvalidChannelName = 3001,
    RouterDropped = 3002,

    // === 4xxx: Диспетчеризация ===
    HandlerFailed = 4000,
    HandlerPanicked = 4001,
    SpawnFailed = 4002,

    // === 5xxx: Планировщик ===
    InvalidScheduleItem = 5000,
    SchedulerStopped = 5001,

    // === 6xxx: Конфигурация ===
    ConfigError = 6000,
    LoggingError = 6001,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    ///
    /// Возвращает `None`, если значение не соответствует ни одному варианту.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка неправильного использования API (диапазоны 2xxx и 3xxx).
    ///
    /// Такие ошибки всегда возвращаются вызывающему синхронно.
    pub fn is_configuration_error(&self) -> bool {
        let c = self.code();
        (2000..=3999).contains(&c) || matches!(self, Self::InvalidArgs)
    }

    /// Ошибка, возникшая внутри обработчика (диапазон 4xxx).
    pub fn is_handler_error(&self) -> bool {
        (4000..=4999).contains(&self.code())
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Internal | Self::HandlerPanicked | Self::SchedulerStopped
        )
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::MalformedNotation
            | Self::UntypedEvent
            | Self::ExpectedSingleEvent
            | Self::InvalidChannelName
            | Self::InvalidArgs => LogLevel::Info,
            Self::NotFirable | Self::SpawnFailed | Self::InvalidScheduleItem => LogLevel::Warn,
            Self::Internal
            | Self::HandlerFailed
            | Self::HandlerPanicked
            | Self::SchedulerStopped => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что ошибки конфигурации определяются по диапазону.
    #[test]
    fn test_configuration_errors() {
        assert!(StatusCode::NotFirable.is_configuration_error());
        assert!(StatusCode::MalformedNotation.is_configuration_error());
        assert!(StatusCode::InvalidArgs.is_configuration_error());
        assert!(!StatusCode::HandlerFailed.is_configuration_error());
    }

    /// Тест проверяет диапазон ошибок обработчиков.
    #[test]
    fn test_handler_errors() {
        assert!(StatusCode::HandlerFailed.is_handler_error());
        assert!(StatusCode::HandlerPanicked.is_handler_error());
        assert!(!StatusCode::SchedulerStopped.is_handler_error());
    }

    /// Тест проверяет конвертацию через `TryFrom<u32>` и `from_u32`.
    #[test]
    fn test_from_try_from_u32() {
        let n = StatusCode::NotFirable.code();
        assert_eq!(StatusCode::try_from(n).unwrap(), StatusCode::NotFirable);
        assert!(StatusCode::from_u32(99999).is_none());
        assert!(StatusCode::is_success(0));
    }

    /// Тест проверяет уровни логирования.
    #[test]
    fn test_log_level_mappings() {
        assert_eq!(StatusCode::Success.log_level(), LogLevel::Trace);
        assert_eq!(StatusCode::HandlerPanicked.log_level(), LogLevel::Error);
        assert_eq!(StatusCode::NotFirable.log_level(), LogLevel::Warn);
    }

    /// Тест проверяет формат `Display` — имя варианта и числовой код.
    #[test]
    fn test_display_contains_name_and_code() {
        let s = format!("{}", StatusCode::NotFirable);
        assert!(s.contains("3000"), "got: {s}");
        assert!(s.contains("NotFirable"), "got: {s}");
    }
}
