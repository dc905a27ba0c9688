use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки планировщика.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Элемент расписания собран некорректно.
    InvalidItem { reason: String },
    /// Фоновый поток планировщика уже остановлен.
    Stopped,
}

impl std::fmt::Display for SchedulerError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::InvalidItem { reason } => write!(f, "invalid schedule item: {reason}"),
            Self::Stopped => write!(f, "time scheduler has been stopped"),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl ErrorExt for SchedulerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidItem { .. } => StatusCode::InvalidScheduleItem,
            Self::Stopped => StatusCode::SchedulerStopped,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
