use std::{any::Any, error::Error};

use crate::StatusCode;

/// Расширение для ошибок шины (object-safe).
///
/// Даёт единый доступ к статус-коду, короткому описанию для хуков и тегам
/// для логов. Все доменные ошибки (`BusError`, `PatternError`,
/// `DispatchError`, `SchedulerError`) реализуют этот трейт и поэтому могут
/// быть обёрнуты в [`StackError`](crate::StackError).
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Статус-код ошибки.
    ///
    /// По умолчанию возвращает [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Возвращает ошибку как [`Any`], чтобы можно было выполнить downcast.
    fn as_any(&self) -> &dyn Any;

    /// Короткое описание без внутренних деталей.
    fn summary(&self) -> String {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal | StatusCode::Unexpected => {
                "internal event bus error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Детализированное сообщение для логов.
    fn log_message(&self) -> String {
        format!("{self:?}")
    }

    /// Пары ключ–значение, которые попадают в структурированные логи.
    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", self.type_name()),
            ("status_code", self.status_code().to_string()),
        ]
    }

    /// Имя типа ошибки.
    fn type_name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("Unknown")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{any::Any, error::Error, fmt};

    use super::*;

    // Ошибка без переопределения status_code (по умолчанию Internal).
    #[derive(Debug)]
    struct DefaultError(pub &'static str);

    impl fmt::Display for DefaultError {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "DefaultError: {}", self.0)
        }
    }

    impl Error for DefaultError {}

    impl ErrorExt for DefaultError {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct NotFirableError(pub &'static str);

    impl fmt::Display for NotFirableError {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "cannot fire on {}", self.0)
        }
    }

    impl Error for NotFirableError {}

    impl ErrorExt for NotFirableError {
        fn status_code(&self) -> StatusCode {
            StatusCode::NotFirable
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Тест проверяет, что внутренние ошибки не раскрывают детали.
    #[test]
    fn test_summary_hides_internal_details() {
        let e = DefaultError("secret");
        assert_eq!(e.status_code(), StatusCode::Internal);
        assert_eq!(e.summary(), "internal event bus error");
    }

    /// Тест проверяет, что доменные ошибки показывают своё сообщение.
    #[test]
    fn test_summary_uses_display() {
        let e = NotFirableError("/temp.*/");
        assert_eq!(e.summary(), "cannot fire on /temp.*/");
    }

    /// Тест проверяет теги и имя типа.
    #[test]
    fn test_metrics_tags_and_type_name() {
        let e = NotFirableError("x");
        let tags = e.metrics_tags();
        assert_eq!(tags[0], ("error_type", "NotFirableError".to_string()));
        assert!(tags[1].1.contains("3000"));
    }

    /// Тест проверяет downcast через `as_any`.
    #[test]
    fn test_as_any_downcast() {
        let e = NotFirableError("x");
        let any = e.as_any();
        assert!(any.downcast_ref::<NotFirableError>().is_some());
        assert!(any.downcast_ref::<DefaultError>().is_none());
    }
}
