//! События и структурное сопоставление.
//!
//! Событие — это тип (`EventType`), позиционные аргументы, именованные
//! аргументы и необязательный обратный вызов. Одно и то же значение служит и
//! экземпляром (то, что отправляют через `fire`), и шаблоном (то, что слушает
//! обработчик).
//!
//! Сопоставление направленное: шаблон `dog[55]` «слышит» `dog[55, 66]`, но не
//! наоборот. Лишние позиционные и именованные аргументы экземпляра
//! игнорируются.

pub mod notation;

use std::{collections::BTreeMap, fmt, sync::Arc};

pub use notation::EventSpec;
use zvon_error::PatternError;

/// Значение аргумента события.
pub type Value = serde_json::Value;

/// Именованные аргументы события (ключи уникальны и упорядочены).
pub type Kwargs = BTreeMap<String, Value>;

/// Зарезервированное имя wildcard-типа.
pub const WILDCARD: &str = "*";

/// Тип события.
///
/// `Any` — wildcard: как шаблон совпадает с любым типом, но отправить такое
/// событие нельзя.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum EventType {
    #[default]
    Any,
    Named(Arc<str>),
}

impl EventType {
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Any => WILDCARD,
            Self::Named(name) => name,
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        if s.is_empty() || s == WILDCARD {
            Self::Any
        } else {
            Self::Named(Arc::from(s))
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl fmt::Display for EventType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Обратный вызов, прикреплённый отправителем к событию.
///
/// Сравнивается по идентичности (указателю), а не по поведению.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn(&Event) + Send + Sync>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(
        &self,
        event: &Event,
    ) {
        (self.0)(event)
    }
}

impl PartialEq for Callback {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callback {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Callback({:p})", Arc::as_ptr(&self.0))
    }
}

/// Событие шины.
///
/// После того как событие отдано в `fire`, оно неизменяемо: аргументы лежат
/// за `Arc`, обработчики получают `&Event`. Методы-конструкторы (`arg`,
/// `kwarg`) копируют данные, если они уже разделяются с другим клоном.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    kind: EventType,
    args: Arc<Vec<Value>>,
    kwargs: Arc<Kwargs>,
    callback: Option<Callback>,
}

impl Event {
    /// Создаёт пустое событие заданного типа. `"*"` даёт wildcard.
    pub fn new(kind: impl Into<EventType>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Шаблон, совпадающий с любым событием.
    pub fn any() -> Self {
        Self::default()
    }

    /// Создаёт событие сразу с аргументами.
    pub fn with_payload(
        kind: impl Into<EventType>,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Self {
        Self {
            kind: kind.into(),
            args: Arc::new(args),
            kwargs: Arc::new(kwargs),
            callback: None,
        }
    }

    /// Добавляет позиционный аргумент.
    pub fn arg(
        mut self,
        value: impl Into<Value>,
    ) -> Self {
        Arc::make_mut(&mut self.args).push(value.into());
        self
    }

    /// Добавляет (или заменяет) именованный аргумент.
    pub fn kwarg(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Arc::make_mut(&mut self.kwargs).insert(key.into(), value.into());
        self
    }

    /// Прикрепляет обратный вызов.
    pub fn with_callback(
        mut self,
        callback: Callback,
    ) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Разбирает компактную запись, например `temp[72, threshold: 90]`.
    pub fn parse(input: &str) -> Result<Self, PatternError> {
        notation::parse(input)
    }

    /// Нормализует любую поддерживаемую форму в список событий.
    pub fn list_from(spec: impl Into<EventSpec>) -> Result<Vec<Self>, PatternError> {
        spec.into().into_events()
    }

    pub fn event_type(&self) -> &EventType {
        &self.kind
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Позиционный аргумент по индексу.
    pub fn get_arg(
        &self,
        index: usize,
    ) -> Option<&Value> {
        self.args.get(index)
    }

    /// Именованный аргумент по ключу.
    pub fn get(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.kwargs.get(key)
    }

    pub fn callback(&self) -> Option<&Callback> {
        self.callback.as_ref()
    }

    /// Вызывает прикреплённый обратный вызов. Возвращает `false`, если его
    /// нет.
    pub fn call_back(&self) -> bool {
        match &self.callback {
            Some(cb) => {
                cb.call(self);
                true
            }
            None => false,
        }
    }

    /// Событие можно отправить только с конкретным типом.
    pub fn is_firable(&self) -> bool {
        !self.kind.is_any()
    }

    /// Проверяет, «слышит» ли шаблон `self` экземпляр `instance`.
    ///
    /// Тип должен совпадать (или шаблон — wildcard), каждый именованный
    /// аргумент шаблона должен быть в экземпляре с тем же значением, каждый
    /// позиционный аргумент шаблона — на той же позиции.
    pub fn hears(
        &self,
        instance: &Event,
    ) -> bool {
        if !self.kind.is_any() && self.kind != instance.kind {
            return false;
        }

        let kwargs_match = self
            .kwargs
            .iter()
            .all(|(key, value)| instance.kwargs.get(key) == Some(value));
        if !kwargs_match {
            return false;
        }

        self.args.len() <= instance.args.len()
            && self.args.iter().zip(instance.args.iter()).all(|(p, i)| p == i)
    }
}

/// Свободная форма [`Event::hears`].
pub fn matches(
    pattern: &Event,
    instance: &Event,
) -> bool {
    pattern.hears(instance)
}

impl From<&str> for Event {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Event {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.args.is_empty() && self.kwargs.is_empty() {
            return Ok(());
        }

        let parts: Vec<String> = self
            .args
            .iter()
            .map(|v| v.to_string())
            .chain(self.kwargs.iter().map(|(k, v)| format!("{k}: {v}")))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
