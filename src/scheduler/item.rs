use std::{
    fmt,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use rand::Rng;
use tracing::warn;
use zvon_error::{bail, BusError, ResultExt, SchedulerError, ZvonResult};

use super::SchedulerShared;
use crate::{
    channel::{Channel, FireOptions},
    event::{Event, EventSpec},
};

/// Отложенная (и, возможно, повторяющаяся) отправка.
///
/// Клоны ссылаются на одну запись. Изменения состояния атомарны: запись
/// можно одновременно держать в нескольких планировщиках и трогать из
/// разных потоков.
#[derive(Clone)]
pub struct TimeSchedulerItem {
    inner: Arc<ItemInner>,
}

struct ItemInner {
    events: Vec<Event>,
    channel: Channel,
    options: FireOptions,
    state: Mutex<ItemState>,
    owners: Mutex<Vec<Weak<SchedulerShared>>>,
}

#[derive(Debug, Clone, Copy)]
struct ItemState {
    time: Instant,
    count: u64,
    interval: Duration,
    jitter: Duration,
    active: bool,
}

impl ItemState {
    fn is_ready(
        &self,
        now: Instant,
    ) -> bool {
        self.active && now >= self.time
    }

    /// Списывает одну отправку и переносит время на следующую.
    fn advance(
        &mut self,
        now: Instant,
    ) {
        self.count = self.count.saturating_sub(1);
        if self.count == 0 {
            self.active = false;
            return;
        }

        let step = if self.jitter.is_zero() {
            self.interval
        } else {
            let j = self.jitter.as_secs_f64();
            let secs = self.interval.as_secs_f64() + rand::thread_rng().gen_range(-j..=j);
            Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
        };

        // Следующий повтор за пределами представимого времени не наступит.
        match self.time.max(now).checked_add(step) {
            Some(next) => self.time = next,
            None => {
                self.count = 0;
                self.active = false;
            }
        }
    }
}

/// Построитель [`TimeSchedulerItem`].
#[derive(Debug, Clone)]
pub struct ItemBuilder {
    time: Instant,
    events: EventSpec,
    channel: Channel,
    count: u64,
    interval: Duration,
    jitter: Duration,
    ignore_past: bool,
    active: bool,
    options: FireOptions,
}

impl ItemBuilder {
    /// Сколько раз отправить (по умолчанию 1).
    pub fn count(
        mut self,
        count: u64,
    ) -> Self {
        self.count = count;
        self
    }

    pub fn interval(
        mut self,
        interval: Duration,
    ) -> Self {
        self.interval = interval;
        self
    }

    /// Максимальное случайное отклонение каждого повтора.
    pub fn jitter(
        mut self,
        jitter: Duration,
    ) -> Self {
        self.jitter = jitter;
        self
    }

    /// Пропустить повторы, время которых уже прошло.
    pub fn ignore_past(
        mut self,
        ignore_past: bool,
    ) -> Self {
        self.ignore_past = ignore_past;
        self
    }

    pub fn active(
        mut self,
        active: bool,
    ) -> Self {
        self.active = active;
        self
    }

    /// Параметры, с которыми запись вызывает `fire`.
    pub fn fire_options(
        mut self,
        options: FireOptions,
    ) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> ZvonResult<TimeSchedulerItem> {
        if !self.channel.is_firable() {
            bail!(BusError::NotFirable {
                channel: self.channel.name().to_string(),
            });
        }

        let events = Event::list_from(self.events)
            .with_context(|| format!("schedule on channel '{}'", self.channel.name()))?;
        if events.is_empty() {
            bail!(SchedulerError::InvalidItem {
                reason: "no events to fire".to_string(),
            });
        }
        if let Some(untyped) = events.iter().find(|e| !e.is_firable()) {
            bail!(SchedulerError::InvalidItem {
                reason: format!("event '{untyped}' has no concrete type"),
            });
        }

        let mut time = self.time;
        let mut count = self.count;
        if self.ignore_past {
            let now = Instant::now();
            while time < now && count > 0 {
                count -= 1;
                match time.checked_add(self.interval) {
                    Some(next) => time = next,
                    None => count = 0,
                }
            }
        }

        Ok(TimeSchedulerItem {
            inner: Arc::new(ItemInner {
                events,
                channel: self.channel,
                options: self.options,
                state: Mutex::new(ItemState {
                    time,
                    count,
                    interval: self.interval,
                    jitter: self.jitter,
                    active: self.active && count > 0,
                }),
                owners: Mutex::new(Vec::new()),
            }),
        })
    }
}

impl TimeSchedulerItem {
    pub fn builder(
        time: Instant,
        events: impl Into<EventSpec>,
        channel: &Channel,
    ) -> ItemBuilder {
        ItemBuilder {
            time,
            events: events.into(),
            channel: channel.clone(),
            count: 1,
            interval: Duration::ZERO,
            jitter: Duration::ZERO,
            ignore_past: false,
            active: true,
            options: FireOptions::default(),
        }
    }

    /// Однократная отправка в момент `time`.
    pub fn once(
        time: Instant,
        events: impl Into<EventSpec>,
        channel: &Channel,
    ) -> ZvonResult<Self> {
        Self::builder(time, events, channel).build()
    }

    pub fn events(&self) -> &[Event] {
        &self.inner.events
    }

    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    pub fn fire_options(&self) -> FireOptions {
        self.inner.options
    }

    /// Время следующей отправки.
    pub fn time(&self) -> Instant {
        self.inner.state.lock().time
    }

    /// Сколько отправок осталось.
    pub fn count(&self) -> u64 {
        self.inner.state.lock().count
    }

    /// Отрицательное значение считается нулём; ноль выключает запись.
    pub fn set_count(
        &self,
        count: i64,
    ) {
        {
            let mut state = self.inner.state.lock();
            state.count = count.max(0) as u64;
            if state.count == 0 {
                state.active = false;
            }
        }
        self.notify_owners();
    }

    pub fn interval(&self) -> Duration {
        self.inner.state.lock().interval
    }

    pub fn jitter(&self) -> Duration {
        self.inner.state.lock().jitter
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    /// Выключает запись; планировщик удалит её при следующем проходе.
    pub fn deactivate(&self) {
        self.inner.state.lock().active = false;
        self.notify_owners();
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready_at(Instant::now())
    }

    pub fn is_ready_at(
        &self,
        now: Instant,
    ) -> bool {
        self.inner.state.lock().is_ready(now)
    }

    /// Сколько осталось до отправки; `None` для выключенной записи.
    pub fn time_until(&self) -> Option<Duration> {
        self.time_until_at(Instant::now())
    }

    pub fn time_until_at(
        &self,
        now: Instant,
    ) -> Option<Duration> {
        let state = self.inner.state.lock();
        state
            .active
            .then(|| state.time.saturating_duration_since(now))
    }

    /// Отправляет все события сейчас, не глядя на готовность. Всегда
    /// возвращает `true`.
    pub fn fire(&self) -> bool {
        self.fire_with(FireOptions::default())
    }

    /// Как [`fire`](Self::fire), но `overrides` накладываются на
    /// сохранённые параметры отправки.
    pub fn fire_with(
        &self,
        overrides: FireOptions,
    ) -> bool {
        self.inner.state.lock().advance(Instant::now());
        self.dispatch(overrides);
        true
    }

    /// Отправляет, только если запись готова. Проверка и перенос времени
    /// выполняются атомарно, так что две гонки за одну запись дают одну
    /// отправку.
    pub fn fire_if_ready(&self) -> bool {
        self.fire_if_ready_with(FireOptions::default())
    }

    pub fn fire_if_ready_with(
        &self,
        overrides: FireOptions,
    ) -> bool {
        {
            let mut state = self.inner.state.lock();
            let now = Instant::now();
            if !state.is_ready(now) {
                return false;
            }
            state.advance(now);
        }
        self.dispatch(overrides);
        true
    }

    pub(super) fn attach(
        &self,
        owner: &Arc<SchedulerShared>,
    ) {
        let mut owners = self.inner.owners.lock();
        owners.retain(|w| w.strong_count() > 0);
        if !owners.iter().any(|w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(owner))) {
            owners.push(Arc::downgrade(owner));
        }
    }

    fn dispatch(
        &self,
        overrides: FireOptions,
    ) {
        let options = self.inner.options.merge(overrides);
        for event in &self.inner.events {
            if let Err(e) = self.inner.channel.fire_with(event.clone(), options) {
                warn!(
                    channel = %self.inner.channel.name(),
                    event = %event,
                    error = %e,
                    "scheduled fire failed"
                );
            }
        }
        self.notify_owners();
    }

    fn notify_owners(&self) {
        let owners: Vec<_> = self
            .inner
            .owners
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for owner in owners {
            owner.wake();
        }
    }
}

impl PartialEq for TimeSchedulerItem {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for TimeSchedulerItem {}

impl fmt::Debug for TimeSchedulerItem {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = *self.inner.state.lock();
        f.debug_struct("TimeSchedulerItem")
            .field("channel", self.inner.channel.name())
            .field("events", &self.inner.events.len())
            .field("time", &state.time)
            .field("count", &state.count)
            .field("interval", &state.interval)
            .field("active", &state.active)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
