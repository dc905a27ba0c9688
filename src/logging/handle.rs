use tracing_subscriber::{reload, EnvFilter, Registry};

use super::filters;
use crate::error::LoggingError;

/// Ручка установленного логирования: позволяет менять фильтр на лету.
#[derive(Clone)]
pub struct LoggingHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LoggingHandle {
    pub(super) fn new(filter: reload::Handle<EnvFilter, Registry>) -> Self {
        Self { filter }
    }

    /// Заменяет фильтр, например `"warn,zvon::hub=trace"`.
    pub fn set_filter(
        &self,
        directive: &str,
    ) -> Result<(), LoggingError> {
        let filter = filters::parse_directive(directive)?;
        self.filter
            .reload(filter)
            .map_err(|e| LoggingError::InvalidDirective {
                directive: directive.to_string(),
                reason: e.to_string(),
            })
    }

    /// Текущая директива фильтра.
    pub fn current_filter(&self) -> Option<String> {
        self.filter.with_current(|f| f.to_string()).ok()
    }
}

impl std::fmt::Debug for LoggingHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoggingHandle")
            .field("filter", &self.current_filter())
            .finish()
    }
}
