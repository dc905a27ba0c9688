use std::{fmt, panic::Location, sync::Arc};

use crate::{ErrorExt, LogLevel, StatusCode};

/// Ошибка с цепочкой контекстов.
///
/// Каждый слой, через который проходит ошибка, может добавить свой контекст
/// вместе с местом вызова (`#[track_caller]`). Хаб использует это, чтобы
/// приклеить к ошибке обработчика место, откуда было вызвано `fire`.
#[derive(Clone)]
pub struct StackError {
    inner: Arc<dyn ErrorExt>,
    contexts: Arc<Vec<ErrorContext>>,
}

/// Контекст ошибки с location tracking.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub location: Option<&'static Location<'static>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    /// Создаёт новую ошибку.
    #[track_caller]
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            inner: Arc::new(err),
            contexts: Arc::new(Vec::new()),
        }
    }

    /// Добавляет контекст к ошибке (место вызова берётся из `caller`).
    #[track_caller]
    pub fn context(
        self,
        msg: impl Into<String>,
    ) -> Self {
        self.context_at(msg, Location::caller())
    }

    /// Добавляет контекст с явно указанным местом.
    ///
    /// Нужен, когда место известно заранее, например место вызова `fire`,
    /// сохранённое в задаче хаба.
    pub fn context_at(
        mut self,
        msg: impl Into<String>,
        location: &'static Location<'static>,
    ) -> Self {
        let mut new_contexts = (*self.contexts).clone();
        new_contexts.push(ErrorContext {
            message: msg.into(),
            location: Some(location),
        });
        self.contexts = Arc::new(new_contexts);
        self
    }

    /// Возвращает код статуса.
    pub fn status_code(&self) -> StatusCode {
        self.inner.status_code()
    }

    /// Короткое описание корневой ошибки.
    pub fn summary(&self) -> String {
        self.inner.summary()
    }

    /// Возвращает корневую ошибку.
    pub fn root(&self) -> &dyn ErrorExt {
        self.inner.as_ref()
    }

    /// Возвращает все контексты.
    pub fn contexts(&self) -> &[ErrorContext] {
        &self.contexts
    }

    /// Теги для структурированных логов.
    pub fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        self.inner.metrics_tags()
    }

    /// Попытка downcast к конкретному типу ошибки.
    pub fn downcast_ref<T: ErrorExt + 'static>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Контексты в виде строк `сообщение (файл:строка)`.
    pub fn format_contexts(&self) -> Vec<String> {
        self.contexts
            .iter()
            .map(|ctx| {
                if let Some(loc) = ctx.location {
                    format!("{} ({}:{})", ctx.message, loc.file(), loc.line())
                } else {
                    ctx.message.clone()
                }
            })
            .collect()
    }

    /// Возвращает уровень логирования.
    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    /// Проверяет, является ли ошибка критичной.
    pub fn is_critical(&self) -> bool {
        self.status_code().is_critical()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StackError
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut debug = f.debug_struct("StackError");
        debug.field("inner", &self.inner.to_string());
        debug.field("status_code", &self.status_code());

        if !self.contexts.is_empty() {
            debug.field("contexts", &self.format_contexts());
        }

        debug.finish()
    }
}

impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if !self.contexts.is_empty() {
            let contexts: Vec<&str> = self.contexts.iter().map(|c| c.message.as_str()).collect();
            write!(f, "{}: {}", contexts.join(" → "), self.inner)
        } else {
            write!(f, "{}", self.inner)
        }
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    #[track_caller]
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BusError, DispatchError};

    #[test]
    fn test_context_chain() {
        let err = BusError::NotFirable {
            channel: "/temp.*/".to_string(),
        };
        let stack = StackError::new(err)
            .context("fire on pattern channel")
            .context("scheduler tick");

        assert_eq!(stack.contexts().len(), 2);
        assert_eq!(stack.contexts()[0].message, "fire on pattern channel");
        assert!(stack.contexts()[0].location.is_some());
    }

    #[test]
    fn test_context_at_keeps_given_location() {
        let loc = Location::caller();
        let stack = StackError::new(DispatchError::HandlerFailed {
            reason: "boom".to_string(),
        })
        .context_at("fired here", loc);

        let ctx = &stack.contexts()[0];
        assert_eq!(ctx.location.map(|l| l.line()), Some(loc.line()));
        assert!(stack.format_contexts()[0].contains("fired here"));
    }

    #[test]
    fn test_downcast() {
        let stack = StackError::new(BusError::UntypedEvent);
        assert!(stack.downcast_ref::<BusError>().is_some());
        assert!(stack.downcast_ref::<DispatchError>().is_none());
    }

    #[test]
    fn test_display() {
        let stack = StackError::new(DispatchError::HandlerPanicked {
            message: "index out of bounds".to_string(),
        })
        .context("handler on alerts");

        let display = stack.to_string();
        assert!(display.contains("handler on alerts"));
        assert!(display.contains("index out of bounds"));
    }
}
