/// Немедленно возвращает ошибку.
///
/// Макрос возвращает `Err(StackError)` из текущей функции. Принимает любой
/// тип ошибки, который превращается в `StackError`.
///
/// ```ignore
/// use zvon_error::{bail, BusError};
///
/// fn check(name: &str) -> zvon_error::ZvonResult<()> {
///     if name.starts_with('/') {
///         bail!(BusError::NotFirable { channel: name.to_string() });
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
}

/// Проверяет условие и вызывает `bail!`, если условие ложно.
///
/// Ошибка вычисляется только при ложном условии.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
}

/// Трейт-расширение для `Result`: `.context(...)` и `.with_context(...)`
/// превращают ошибку в [`StackError`](crate::StackError) и добавляют контекст.
pub trait ResultExt<T> {
    /// Добавляет контекст к ошибке.
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    /// Добавляет ленивый контекст (вызывается только в случае ошибки).
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        let loc = std::panic::Location::caller();
        self.map_err(|e| e.into().context_at(ctx, loc))
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        let loc = std::panic::Location::caller();
        self.map_err(|e| e.into().context_at(f(), loc))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BusError, SchedulerError, StatusCode, ZvonResult};

    /// Тест проверяет, что `bail!` возвращает ошибку с её кодом.
    #[test]
    fn test_bail_simple() {
        fn example() -> ZvonResult<()> {
            bail!(BusError::UntypedEvent);
        }

        let err = example().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UntypedEvent);
    }

    /// Тест проверяет, что `ensure!` срабатывает только на ложном условии.
    #[test]
    fn test_ensure() {
        fn validate(count: u64) -> ZvonResult<u64> {
            ensure!(
                count > 0,
                SchedulerError::InvalidItem {
                    reason: format!("count must be positive, got {count}"),
                }
            );
            Ok(count)
        }

        assert_eq!(validate(3).unwrap(), 3);
        let err = validate(0).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidScheduleItem);
        assert!(err.to_string().contains("got 0"));
    }

    /// Тест проверяет, что `context` добавляет слой к ошибке любого
    /// совместимого типа.
    #[test]
    fn test_result_ext() {
        fn inner() -> Result<(), BusError> {
            Err(BusError::NotFirable {
                channel: "sensors.*".to_string(),
            })
        }

        fn outer() -> ZvonResult<()> {
            inner().context("outer context")?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert_eq!(err.contexts().len(), 1);
        assert_eq!(err.contexts()[0].message, "outer context");
        assert_eq!(err.status_code(), StatusCode::NotFirable);
    }

    /// Тест проверяет, что ленивый контекст вычисляется только при ошибке.
    #[test]
    fn test_with_context_lazy() {
        fn example(
            success: bool,
            calls: &mut usize,
        ) -> ZvonResult<()> {
            let result: Result<(), BusError> = if success {
                Ok(())
            } else {
                Err(BusError::UntypedEvent)
            };

            result.with_context(|| {
                *calls += 1;
                "expensive context".to_string()
            })?;
            Ok(())
        }

        let mut calls = 0;
        assert!(example(true, &mut calls).is_ok());
        assert_eq!(calls, 0);
        assert!(example(false, &mut calls).is_err());
        assert_eq!(calls, 1);
    }
}
