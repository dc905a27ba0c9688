use std::{path::Path, time::Duration};

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    error::SettingsError,
    hub::{Hub, HubConfig},
    logging::LoggingConfig,
    router::{Router, RouterPolicy},
    scheduler::TimeScheduler,
};

/// Настройки шины.
///
/// Источники по возрастанию приоритета: значения по умолчанию, файл (если
/// указан), переменные окружения с префиксом `ZVON_`. Вложенные поля
/// разделяются двойным подчёркиванием: `ZVON_LOGGING__LEVEL=debug`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Предел одновременно выполняющихся задач хаба; `None` — без предела.
    pub max_children: Option<usize>,
    pub router_policy: RouterPolicy,
    /// Таймаут `sync_on` по умолчанию; `None` — ждать бесконечно.
    pub sync_timeout_ms: Option<u64>,
    pub capture_backtrace: bool,
    /// Префикс имён потоков хаба и планировщика.
    pub thread_name: String,
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_children: None,
            router_policy: RouterPolicy::Default,
            sync_timeout_ms: None,
            capture_backtrace: false,
            thread_name: "zvon".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Загружает настройки из окружения.
    pub fn load() -> Result<Self, SettingsError> {
        let cfg = Config::builder().add_source(env_source()).build()?;
        Self::from_config(cfg)
    }

    /// Загружает настройки из файла (формат по расширению) и окружения.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let cfg = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;
        Self::from_config(cfg)
    }

    pub fn from_config(cfg: Config) -> Result<Self, SettingsError> {
        let settings: Self = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_children == Some(0) {
            return Err(SettingsError::Invalid {
                key: "max_children",
                reason: "must be at least 1 (omit for unlimited)".to_string(),
            });
        }
        if self.thread_name.trim().is_empty() {
            return Err(SettingsError::Invalid {
                key: "thread_name",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn sync_timeout(&self) -> Option<Duration> {
        self.sync_timeout_ms.map(Duration::from_millis)
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_children: self.max_children,
            thread_name: self.thread_name.clone(),
            capture_backtrace: self.capture_backtrace,
        }
    }

    pub fn build_hub(&self) -> Hub {
        Hub::new(self.hub_config())
    }

    /// Маршрутизатор со своим хабом, политикой и таймаутом.
    pub fn build_router(&self) -> Router {
        let router = Router::new(self.build_hub());
        router.set_policy(self.router_policy);
        router.set_sync_timeout(self.sync_timeout());
        router
    }

    pub fn build_scheduler(&self) -> TimeScheduler {
        TimeScheduler::new(self.thread_name.clone())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("ZVON")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use std::{env, io::Write};

    use serial_test::serial;

    use super::*;
    use crate::logging::LogFormat;

    /// Тест проверяет значения по умолчанию при пустом окружении.
    #[test]
    #[serial]
    fn test_defaults() {
        let settings = Settings::load().unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.sync_timeout().is_none());
    }

    /// Тест проверяет чтение из переменных окружения, включая вложенные.
    #[test]
    #[serial]
    fn test_env_source() {
        env::set_var("ZVON_MAX_CHILDREN", "4");
        env::set_var("ZVON_ROUTER_POLICY", "simple");
        env::set_var("ZVON_SYNC_TIMEOUT_MS", "250");
        env::set_var("ZVON_LOGGING__FORMAT", "json");

        let settings = Settings::load();

        env::remove_var("ZVON_MAX_CHILDREN");
        env::remove_var("ZVON_ROUTER_POLICY");
        env::remove_var("ZVON_SYNC_TIMEOUT_MS");
        env::remove_var("ZVON_LOGGING__FORMAT");

        let settings = settings.unwrap();
        assert_eq!(settings.max_children, Some(4));
        assert_eq!(settings.router_policy, RouterPolicy::Simple);
        assert_eq!(settings.sync_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    /// Тест проверяет загрузку из файла.
    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .prefix("zvon-settings-")
            .suffix(".json")
            .tempfile()
            .unwrap();
        write!(
            file,
            r#"{{"max_children": 2, "thread_name": "bus", "logging": {{"level": "warn"}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let settings = Settings::load_from(file.path());

        let settings = settings.unwrap();
        assert_eq!(settings.max_children, Some(2));
        assert_eq!(settings.thread_name, "bus");
        assert_eq!(settings.logging.level, "warn");
        assert_eq!(settings.router_policy, RouterPolicy::Default);
    }

    /// Тест проверяет отказ на некорректных значениях.
    #[test]
    fn test_validate() {
        let zero = Settings {
            max_children: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(SettingsError::Invalid { key: "max_children", .. })
        ));

        let unnamed = Settings {
            thread_name: " ".to_string(),
            ..Default::default()
        };
        assert!(unnamed.validate().is_err());
    }

    /// Тест проверяет, что маршрутизатор собирается по настройкам.
    #[test]
    fn test_build_router() {
        let settings = Settings {
            max_children: Some(3),
            router_policy: RouterPolicy::Simple,
            sync_timeout_ms: Some(100),
            ..Default::default()
        };

        let router = settings.build_router();
        assert_eq!(router.policy(), RouterPolicy::Simple);
        assert_eq!(router.sync_timeout(), Some(Duration::from_millis(100)));
        assert_eq!(router.hub().max_children(), Some(3));
    }
}
