pub mod bus;
pub mod dispatch;
pub mod scheduler;

// Публичный экспорт всех типов ошибок из вложенных модулей.
pub use bus::*;
pub use dispatch::*;
pub use scheduler::*;

use crate::StackError;

impl From<globset::Error> for StackError {
    #[track_caller]
    fn from(err: globset::Error) -> Self {
        StackError::new(BusError::InvalidChannelName {
            name: err.glob().unwrap_or_default().to_string(),
            reason: err.kind().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusCode;

    /// Тест проверяет, что ошибка разбора glob становится ошибкой имени
    /// канала с исходным шаблоном.
    #[test]
    fn test_glob_error_conversion() {
        let err = globset::Glob::new("sensors.[").unwrap_err();
        let stack = StackError::from(err);

        assert_eq!(stack.status_code(), StatusCode::InvalidChannelName);
        match stack.downcast_ref::<BusError>() {
            Some(BusError::InvalidChannelName { name, .. }) => assert_eq!(name, "sensors.["),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
