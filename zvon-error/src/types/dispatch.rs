use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки, возникшие при выполнении обработчика.
///
/// Никогда не доходят до того, кто вызвал `fire`: хаб оборачивает их в
/// `StackError` с местом вызова и передаёт в хук исключений.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Обработчик вернул `Err`.
    HandlerFailed { reason: String },
    /// Обработчик запаниковал.
    HandlerPanicked { message: String },
    /// ОС отказала в создании потока.
    SpawnFailed { reason: String },
}

impl std::fmt::Display for DispatchError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::HandlerFailed { reason } => write!(f, "handler failed: {reason}"),
            Self::HandlerPanicked { message } => write!(f, "handler panicked: {message}"),
            Self::SpawnFailed { reason } => write!(f, "failed to spawn hub task: {reason}"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl ErrorExt for DispatchError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::HandlerFailed { .. } => StatusCode::HandlerFailed,
            Self::HandlerPanicked { .. } => StatusCode::HandlerPanicked,
            Self::SpawnFailed { .. } => StatusCode::SpawnFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    // Сообщение обработчика — это пользовательский текст, его и показываем.
    fn summary(&self) -> String {
        self.to_string()
    }
}
