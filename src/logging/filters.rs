use tracing_subscriber::EnvFilter;

use super::LoggingConfig;
use crate::error::LoggingError;

/// Собирает фильтр: `RUST_LOG`, если задан и корректен, иначе директива из
/// конфигурации.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    parse_directive(&config.build_filter_directive())
}

pub fn parse_directive(directive: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directive).map_err(|e| LoggingError::InvalidDirective {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}
