//! Каналы: регистрация обработчиков и отправка событий.
//!
//! - `handler`: обработчики и сильные/слабые ссылки на них.
//! - `intern` (приватный): пул `Arc<str>` для точных имён.
//! - `name`: имена каналов (точные, glob, regex).
//! - `sync`: синхронное ожидание события (`sync_on`).

mod handler;
mod intern;
mod name;
mod sync;

use std::{
    collections::HashSet,
    fmt,
    panic::Location,
    sync::{Arc, Weak},
    time::Duration,
};

pub use handler::{Handler, Lifetime};
pub(crate) use handler::HandlerRef;
pub(crate) use intern::intern_channel;
pub use name::{ChannelName, GlobName};
use parking_lot::Mutex;
pub use sync::SyncHelper;
use tracing::trace;
use zvon_error::{bail, ensure, BusError, ResultExt, ZvonResult};

use crate::{
    event::{Event, EventSpec},
    hub::{FireTrace, Spawned, Task},
    router::{Router, RouterInner},
};

/// Параметры отправки.
///
/// Оба флага необязательны: незаданный `blocking` — `false`, незаданный
/// `parallel` — `!blocking`. Благодаря `Option` параметры можно
/// накладывать друг на друга (`merge`), как это делает планировщик.
///
/// | blocking | parallel | поведение |
/// |---|---|---|
/// | false | true | каждый обработчик в своей задаче, `fire` не ждёт |
/// | false | false | все обработчики по очереди в одной фоновой задаче |
/// | true | false | все обработчики по очереди в потоке вызывающего |
/// | true | true | каждый обработчик в своей задаче, `fire` ждёт всех |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FireOptions {
    pub blocking: Option<bool>,
    pub parallel: Option<bool>,
}

impl FireOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocking(
        mut self,
        blocking: bool,
    ) -> Self {
        self.blocking = Some(blocking);
        self
    }

    pub fn parallel(
        mut self,
        parallel: bool,
    ) -> Self {
        self.parallel = Some(parallel);
        self
    }

    /// Накладывает `overrides` поверх `self`.
    pub fn merge(
        self,
        overrides: FireOptions,
    ) -> Self {
        Self {
            blocking: overrides.blocking.or(self.blocking),
            parallel: overrides.parallel.or(self.parallel),
        }
    }

    /// Итоговые `(blocking, parallel)`.
    pub fn resolve(&self) -> (bool, bool) {
        let blocking = self.blocking.unwrap_or(false);
        (blocking, self.parallel.unwrap_or(!blocking))
    }
}

/// Снимок одной регистрации.
pub type RegistrationView = (Arc<[Event]>, Handler);

struct Registration {
    patterns: Arc<[Event]>,
    handler: HandlerRef,
}

/// Именованная точка маршрутизации.
///
/// Для каждого имени в маршрутизаторе существует ровно один экземпляр;
/// `Channel` — дешёвая ссылка на него, сравнение — по идентичности.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

pub(crate) struct ChannelInner {
    name: ChannelName,
    registrations: Mutex<Vec<Registration>>,
    router: Weak<RouterInner>,
}

impl ChannelInner {
    /// Удаляет все регистрации обработчика. Попутно чистит мёртвые слабые
    /// ссылки.
    pub(crate) fn remove_handler(
        &self,
        handler: &Handler,
    ) -> bool {
        let mut regs = self.registrations.lock();
        regs.retain(|r| r.handler.is_alive());
        let before = regs.len();
        regs.retain(|r| !r.handler.refers_to(handler));
        regs.len() != before
    }
}

impl Channel {
    /// Создаёт канал, привязанный к маршрутизатору, но не регистрирует его в
    /// таблице. Используется как фабрика в [`Router::get_or_create`].
    pub fn new(
        router: &Router,
        name: ChannelName,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name,
                registrations: Mutex::new(Vec::new()),
                router: router.downgrade(),
            }),
        }
    }

    /// Канал с данным именем в глобальном маршрутизаторе.
    pub fn lookup(name: impl Into<ChannelName>) -> Self {
        Router::global().lookup(name)
    }

    /// Забывает имя в глобальном маршрутизаторе.
    pub fn forget(name: impl Into<ChannelName>) -> bool {
        Router::global().forget(name)
    }

    pub fn name(&self) -> &ChannelName {
        &self.inner.name
    }

    pub fn is_firable(&self) -> bool {
        self.inner.name.is_firable()
    }

    /// Маршрутизатор, которому принадлежит канал.
    pub fn router(&self) -> ZvonResult<Router> {
        match self.inner.router.upgrade() {
            Some(inner) => Ok(Router::from_inner(inner)),
            None => bail!(BusError::RouterDropped {
                channel: self.inner.name.to_string(),
            }),
        }
    }

    /// Регистрирует замыкание как сильный обработчик.
    ///
    /// Пустой список шаблонов означает «любое событие».
    pub fn register<F>(
        &self,
        patterns: impl Into<EventSpec>,
        f: F,
    ) -> ZvonResult<Handler>
    where
        F: Fn(&Event, &ChannelName) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_handler(patterns, &Handler::new(f), Lifetime::Strong)
    }

    /// Регистрирует существующий обработчик. Повторная регистрация создаёт
    /// ещё одну запись; за одну отправку обработчик всё равно вызывается
    /// один раз.
    pub fn register_handler(
        &self,
        patterns: impl Into<EventSpec>,
        handler: &Handler,
        lifetime: Lifetime,
    ) -> ZvonResult<Handler> {
        let mut patterns = Event::list_from(patterns)
            .with_context(|| format!("register handler on channel '{}'", self.inner.name))?;
        if patterns.is_empty() {
            patterns.push(Event::any());
        }

        self.inner.registrations.lock().push(Registration {
            patterns: patterns.into(),
            handler: HandlerRef::new(handler, lifetime),
        });
        handler.remember_channel(&self.inner);

        trace!(channel = %self.inner.name, handler = handler.id(), ?lifetime, "handler registered");
        Ok(handler.clone())
    }

    /// Регистрирует обработчик слабо.
    pub fn register_weak(
        &self,
        patterns: impl Into<EventSpec>,
        handler: &Handler,
    ) -> ZvonResult<Handler> {
        self.register_handler(patterns, handler, Lifetime::Weak)
    }

    /// Удаляет все регистрации обработчика на этом канале.
    pub fn unregister(
        &self,
        handler: &Handler,
    ) -> bool {
        self.inner.remove_handler(handler)
    }

    /// Снимок регистраций: слабые ссылки разрешены, мёртвые удалены.
    pub fn handlers(&self) -> Vec<RegistrationView> {
        let mut regs = self.inner.registrations.lock();
        regs.retain(|r| r.handler.is_alive());
        regs.iter()
            .filter_map(|r| r.handler.resolve().map(|h| (r.patterns.clone(), h)))
            .collect()
    }

    /// Удаляет все регистрации.
    pub fn clear(&self) {
        self.inner.registrations.lock().clear();
    }

    /// `self =~ other`: является ли `self` получателем событий `other`.
    pub fn is_receiver_of(
        &self,
        other: &Channel,
    ) -> bool {
        other
            .router()
            .map(|router| router.get_receivers(other).contains(self))
            .unwrap_or(false)
    }

    /// Неблокирующая параллельная отправка.
    #[track_caller]
    pub fn fire(
        &self,
        event: impl Into<EventSpec>,
    ) -> ZvonResult<Vec<Spawned>> {
        self.fire_at(event.into(), FireOptions::default(), Location::caller())
    }

    /// Отправка с явными параметрами.
    #[track_caller]
    pub fn fire_with(
        &self,
        event: impl Into<EventSpec>,
        options: FireOptions,
    ) -> ZvonResult<Vec<Spawned>> {
        self.fire_at(event.into(), options, Location::caller())
    }

    /// Блокирующая отправка: `blocking` по умолчанию `true`, но явно
    /// заданный `false` сохраняется.
    #[track_caller]
    pub fn fire_blocking(
        &self,
        event: impl Into<EventSpec>,
    ) -> ZvonResult<Vec<Spawned>> {
        self.fire_blocking_with(event, FireOptions::default())
    }

    #[track_caller]
    pub fn fire_blocking_with(
        &self,
        event: impl Into<EventSpec>,
        options: FireOptions,
    ) -> ZvonResult<Vec<Spawned>> {
        let options = FireOptions::new().blocking(true).merge(options);
        self.fire_at(event.into(), options, Location::caller())
    }

    fn fire_at(
        &self,
        spec: EventSpec,
        options: FireOptions,
        location: &'static Location<'static>,
    ) -> ZvonResult<Vec<Spawned>> {
        ensure!(
            self.is_firable(),
            BusError::NotFirable {
                channel: self.inner.name.to_string(),
            }
        );

        let router = self.router()?;
        let mut events = Event::list_from(spec)?;
        ensure!(events.len() == 1, BusError::ExpectedSingleEvent { got: events.len() });
        let event = events.remove(0);
        ensure!(event.is_firable(), BusError::UntypedEvent);

        let trace = FireTrace::capture(location, router.hub().captures_backtrace());
        let (blocking, parallel) = options.resolve();

        if !blocking && !parallel {
            let channel = self.clone();
            let hub = router.hub().clone();
            let spawned = hub.spawn_detached(move || {
                channel.dispatch(&router, event, false, false, trace);
            });
            return Ok(vec![spawned]);
        }

        Ok(self.dispatch(&router, event, blocking, parallel, trace))
    }

    fn dispatch(
        &self,
        router: &Router,
        event: Event,
        blocking: bool,
        parallel: bool,
        trace: FireTrace,
    ) -> Vec<Spawned> {
        let name = &self.inner.name;
        router.run_before_fire(&event, name);

        let mut seen = HashSet::new();
        let mut matched = Vec::new();
        for receiver in router.get_receivers(self) {
            for (patterns, handler) in receiver.handlers() {
                if patterns.iter().any(|p| p.hears(&event)) && seen.insert(handler.id()) {
                    matched.push(handler);
                }
            }
        }

        trace!(
            channel = %name,
            event_type = %event.event_type(),
            handlers = matched.len(),
            blocking,
            parallel,
            "firing event"
        );

        let hub = router.hub();
        let spawned: Vec<Spawned> = matched
            .into_iter()
            .map(|handler| {
                hub.spawn(Task {
                    event: event.clone(),
                    channel: name.clone(),
                    handler,
                    blocking,
                    parallel,
                    trace: trace.clone(),
                })
            })
            .collect();

        if blocking && parallel {
            for s in &spawned {
                s.join();
            }
        }

        router.run_after_fire(&event, name);
        spawned
    }

    /// Блокирует поток до прихода подходящего события.
    ///
    /// На входе регистрируется временный обработчик, который складывает
    /// подходящие события в очередь ещё до первого `wait`, поэтому событие,
    /// отправленное прямо внутри `block`, не теряется. Если `block` ни разу
    /// не вызвал `wait`, после него выполняется неявное ожидание. Результат —
    /// итог последнего ожидания; `None` при таймауте.
    ///
    /// `timeout = None` берёт значение по умолчанию из маршрутизатора; если
    /// и там `None`, ожидание бесконечно.
    pub fn sync_on<F>(
        &self,
        patterns: impl Into<EventSpec>,
        timeout: Option<Duration>,
        block: F,
    ) -> ZvonResult<Option<Event>>
    where
        F: FnOnce(&mut SyncHelper),
    {
        let timeout = match timeout {
            Some(t) => Some(t),
            None => self.router()?.sync_timeout(),
        };

        let mut helper = SyncHelper::attach(self, patterns, timeout)?;
        block(&mut helper);
        if !helper.has_waited() {
            helper.wait();
        }
        Ok(helper.into_result())
    }
}

impl PartialEq for Channel {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Channel {}

impl fmt::Debug for Channel {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.inner.name)
            .field("registrations", &self.inner.registrations.lock().len())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
