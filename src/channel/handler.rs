use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;

use super::{ChannelInner, ChannelName};
use crate::event::Event;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

type HandlerFn = dyn Fn(&Event, &ChannelName) -> anyhow::Result<()> + Send + Sync;

/// Обработчик событий.
///
/// Дешёвая ссылка (`Arc`) на функцию. Идентичность определяется указателем:
/// два `Handler`, созданные из одинаковых замыканий, различны, а клоны одного
/// `Handler` — один и тот же обработчик.
///
/// Канал, на котором зарегистрирован обработчик, запоминается, чтобы
/// [`Handler::unregister_everywhere`] мог снять его отовсюду.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerInner>,
}

pub(crate) struct HandlerInner {
    id: u64,
    func: Box<HandlerFn>,
    channels: Mutex<Vec<Weak<ChannelInner>>>,
}

/// Как регистрация держит обработчик.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifetime {
    /// Регистрация держит обработчик (и всё, что он захватил) живым.
    #[default]
    Strong,
    /// Регистрация не продлевает жизнь обработчика. Когда последний
    /// внешний `Handler` уничтожен, регистрация молча перестаёт срабатывать
    /// и удаляется при следующем обращении к каналу.
    Weak,
}

/// Ссылка на обработчик внутри регистрации.
#[derive(Clone)]
pub(crate) enum HandlerRef {
    Strong(Handler),
    Weak(Weak<HandlerInner>),
}

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Event, &ChannelName) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(HandlerInner {
                id: NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed),
                func: Box::new(f),
                channels: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Уникальный номер обработчика в процессе.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn call(
        &self,
        event: &Event,
        channel: &ChannelName,
    ) -> anyhow::Result<()> {
        (self.inner.func)(event, channel)
    }

    /// Снимает обработчик со всех каналов, где он когда-либо был
    /// зарегистрирован. Возвращает количество каналов, с которых он снят.
    pub fn unregister_everywhere(&self) -> usize {
        let channels: Vec<_> = self.inner.channels.lock().drain(..).collect();
        channels
            .into_iter()
            .filter_map(|weak| weak.upgrade())
            .filter(|channel| channel.remove_handler(self))
            .count()
    }

    pub(crate) fn remember_channel(
        &self,
        channel: &Arc<ChannelInner>,
    ) {
        let mut channels = self.inner.channels.lock();
        channels.retain(|w| w.strong_count() > 0);
        if !channels
            .iter()
            .any(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(channel)))
        {
            channels.push(Arc::downgrade(channel));
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<HandlerInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn is(
        &self,
        inner: &Weak<HandlerInner>,
    ) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.inner), inner.as_ptr())
    }
}

impl PartialEq for Handler {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Handler").field("id", &self.inner.id).finish()
    }
}

impl HandlerRef {
    pub(crate) fn new(
        handler: &Handler,
        lifetime: Lifetime,
    ) -> Self {
        match lifetime {
            Lifetime::Strong => Self::Strong(handler.clone()),
            Lifetime::Weak => Self::Weak(handler.downgrade()),
        }
    }

    /// Разрешает ссылку. `None` означает, что слабый обработчик уже умер.
    pub(crate) fn resolve(&self) -> Option<Handler> {
        match self {
            Self::Strong(h) => Some(h.clone()),
            Self::Weak(w) => w.upgrade().map(|inner| Handler { inner }),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        match self {
            Self::Strong(_) => true,
            Self::Weak(w) => w.strong_count() > 0,
        }
    }

    pub(crate) fn refers_to(
        &self,
        handler: &Handler,
    ) -> bool {
        match self {
            Self::Strong(h) => h == handler,
            Self::Weak(w) => handler.is(w),
        }
    }
}
