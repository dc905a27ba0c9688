//! Логирование через `tracing`.
//!
//! Сама шина только пишет события `tracing`; установить подписчика должен
//! тот, кто её использует. [`init_logging`] делает это одной строкой.

mod config;
mod filters;
mod formatter;
mod handle;

pub use config::{LogFormat, LoggingConfig};
pub use formatter::build_layer;
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt};

use crate::error::LoggingError;

/// Устанавливает глобального подписчика. Повторный вызов возвращает
/// ошибку, а не паникует.
pub fn init_logging(mut config: LoggingConfig) -> Result<LoggingHandle, LoggingError> {
    config.apply_env_overrides();
    config.validate()?;

    let (filter, reload_handle) = reload::Layer::new(filters::build_filter(&config)?);
    let console = build_layer(&config, std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = %config.format,
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(reload_handle))
}
