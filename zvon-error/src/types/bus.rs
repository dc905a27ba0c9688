use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки неправильного использования шины.
///
/// Возвращаются вызывающему синхронно, в момент вызова.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// `fire` на канале, чьё имя является шаблоном (glob/regex).
    NotFirable { channel: String },
    /// Событие без конкретного типа (wildcard) нельзя отправить.
    UntypedEvent,
    /// На вход `fire` пришло не ровно одно событие.
    ExpectedSingleEvent { got: usize },
    /// Канал пережил свой маршрутизатор.
    RouterDropped { channel: String },
    /// Некорректное имя-шаблон канала.
    InvalidChannelName { name: String, reason: String },
}

/// Ошибка разбора компактной записи события, например `temp[72, threshold: 90]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternError {
    /// Исходная запись.
    pub input: String,
    /// Байтовая позиция, на которой разбор остановился.
    pub position: usize,
    pub reason: String,
}

impl PatternError {
    pub fn new(
        input: impl Into<String>,
        position: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            position,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for BusError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::NotFirable { channel } => write!(
                f,
                "channel {channel} is a listening pattern and cannot be fired on"
            ),
            Self::UntypedEvent => write!(f, "cannot fire a wildcard (untyped) event"),
            Self::ExpectedSingleEvent { got } => {
                write!(f, "expected exactly one event to fire, got {got}")
            }
            Self::RouterDropped { channel } => {
                write!(f, "router owning channel {channel} has been dropped")
            }
            Self::InvalidChannelName { name, reason } => {
                write!(f, "invalid channel pattern '{name}': {reason}")
            }
        }
    }
}

impl std::error::Error for BusError {}

impl ErrorExt for BusError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFirable { .. } => StatusCode::NotFirable,
            Self::UntypedEvent => StatusCode::UntypedEvent,
            Self::ExpectedSingleEvent { .. } => StatusCode::ExpectedSingleEvent,
            Self::RouterDropped { .. } => StatusCode::RouterDropped,
            Self::InvalidChannelName { .. } => StatusCode::InvalidChannelName,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "bus".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::NotFirable { channel } | Self::RouterDropped { channel } => {
                tags.push(("channel", channel.clone()));
            }
            Self::InvalidChannelName { name, .. } => {
                tags.push(("channel", name.clone()));
            }
            _ => {}
        }

        tags
    }
}

impl std::fmt::Display for PatternError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "malformed event notation '{}' at {}: {}",
            self.input, self.position, self.reason
        )
    }
}

impl std::error::Error for PatternError {}

impl ErrorExt for PatternError {
    fn status_code(&self) -> StatusCode {
        StatusCode::MalformedNotation
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
