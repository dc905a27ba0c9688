use std::{env, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::LoggingError;

/// Формат консольного вывода.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// Настройки логирования.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень: `trace`, `debug`, `info`, `warn`, `error`, `off`.
    pub level: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    /// Имена потоков полезны: задачи хаба и планировщик работают в
    /// именованных потоках.
    pub with_thread_names: bool,
    pub with_line_numbers: bool,
    /// Дополнительные директивы, например `zvon::hub=debug`.
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            with_ansi: true,
            with_target: true,
            with_thread_names: true,
            with_line_numbers: false,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Переменные `ZVON_LOG_LEVEL` и `ZVON_LOG_FORMAT` имеют приоритет над
    /// конфигурацией. Некорректный формат игнорируется.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("ZVON_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.level = level.trim().to_string();
            }
        }
        if let Ok(format) = env::var("ZVON_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                self.format = format;
            }
        }
    }

    /// Итоговая строка для `EnvFilter`.
    pub fn build_filter_directive(&self) -> String {
        std::iter::once(self.level.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .filter(|d| !d.trim().is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];
        if !LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            return Err(LoggingError::InvalidDirective {
                directive: self.level.clone(),
                reason: format!("level must be one of {}", LEVELS.join(", ")),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    /// Тест проверяет сборку директивы из уровня и дополнительных правил.
    #[test]
    fn test_build_filter_directive() {
        let cfg = LoggingConfig {
            level: "warn".to_string(),
            directives: vec!["zvon::hub=debug".to_string(), " ".to_string()],
            ..Default::default()
        };
        assert_eq!(cfg.build_filter_directive(), "warn,zvon::hub=debug");
    }

    /// Тест проверяет разбор формата.
    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" compact ".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LoggingError::UnknownFormat(f)) if f == "xml"
        ));
        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
    }

    /// Тест проверяет проверку уровня.
    #[test]
    fn test_validate_level() {
        assert!(LoggingConfig::default().validate().is_ok());
        let cfg = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    /// Тест проверяет переопределение через переменные окружения.
    #[test]
    #[serial]
    fn test_env_overrides() {
        env::set_var("ZVON_LOG_LEVEL", "debug");
        env::set_var("ZVON_LOG_FORMAT", "json");

        let mut cfg = LoggingConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);

        env::set_var("ZVON_LOG_FORMAT", "bogus");
        let mut cfg = LoggingConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.format, LogFormat::Pretty);

        env::remove_var("ZVON_LOG_LEVEL");
        env::remove_var("ZVON_LOG_FORMAT");
    }

    /// Тест проверяет десериализацию с частично заданными полями.
    #[test]
    fn test_deserialize_partial() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{"level": "error", "format": "compact"}"#).unwrap();
        assert_eq!(cfg.level, "error");
        assert_eq!(cfg.format, LogFormat::Compact);
        assert!(cfg.with_thread_names);
    }
}
