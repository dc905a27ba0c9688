use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    channel::{Channel, ChannelName},
    event::Event,
    hub::Hub,
};

static GLOBAL_ROUTER: Lazy<Router> = Lazy::new(|| Router::new(Hub::global().clone()));

/// Хук, вызываемый до или после каждой отправки.
pub type FireHook = Arc<dyn Fn(&Event, &ChannelName) + Send + Sync>;

/// Правило выбора получателей.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterPolicy {
    /// Сам канал, wildcard-канал `*` и все шаблонные каналы, чьё имя
    /// подходит. Отправка в `*` доходит до всех каналов.
    #[default]
    Default,
    /// Только сам канал.
    Simple,
}

/// Номер хука для последующего удаления.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

#[derive(Default)]
struct FireHooks {
    before: Vec<(HookId, FireHook)>,
    after: Vec<(HookId, FireHook)>,
}

/// Таблица каналов.
///
/// Для каждого имени хранит единственный [`Channel`]. Точные имена и
/// шаблоны лежат в разных таблицах: шаблоны перебираются при поиске
/// получателей, точные имена берутся по ключу.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

pub(crate) struct RouterInner {
    exact: DashMap<ChannelName, Channel>,
    fuzzy: DashMap<ChannelName, Channel>,
    policy: RwLock<RouterPolicy>,
    hooks: RwLock<FireHooks>,
    next_hook: AtomicU64,
    sync_timeout: RwLock<Option<Duration>>,
    hub: Hub,
}

impl Router {
    pub fn new(hub: Hub) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                exact: DashMap::new(),
                fuzzy: DashMap::new(),
                policy: RwLock::new(RouterPolicy::Default),
                hooks: RwLock::new(FireHooks::default()),
                next_hook: AtomicU64::new(1),
                sync_timeout: RwLock::new(None),
                hub,
            }),
        }
    }

    /// Маршрутизатор процесса. Работает поверх [`Hub::global`].
    pub fn global() -> &'static Router {
        &GLOBAL_ROUTER
    }

    pub(crate) fn from_inner(inner: Arc<RouterInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RouterInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn hub(&self) -> &Hub {
        &self.inner.hub
    }

    pub fn policy(&self) -> RouterPolicy {
        *self.inner.policy.read()
    }

    pub fn set_policy(
        &self,
        policy: RouterPolicy,
    ) {
        *self.inner.policy.write() = policy;
    }

    /// Таймаут `sync_on` по умолчанию.
    pub fn sync_timeout(&self) -> Option<Duration> {
        *self.inner.sync_timeout.read()
    }

    pub fn set_sync_timeout(
        &self,
        timeout: Option<Duration>,
    ) {
        *self.inner.sync_timeout.write() = timeout;
    }

    /// Возвращает канал для имени, создавая его через `factory` при первом
    /// обращении.
    ///
    /// `factory` выполняется под блокировкой сегмента таблицы и не должна
    /// обращаться к этому же маршрутизатору.
    pub fn get_or_create<F>(
        &self,
        name: impl Into<ChannelName>,
        factory: F,
    ) -> Channel
    where
        F: FnOnce(&Router, ChannelName) -> Channel,
    {
        let name = name.into();
        let table = self.table_for(&name);

        if let Some(channel) = table.get(&name) {
            return channel.clone();
        }

        table
            .entry(name.clone())
            .or_insert_with(|| {
                debug!(channel = %name, "channel created");
                factory(self, name)
            })
            .clone()
    }

    pub fn lookup(
        &self,
        name: impl Into<ChannelName>,
    ) -> Channel {
        self.get_or_create(name, Channel::new)
    }

    /// Убирает имя из таблицы и снимает все регистрации канала. Следующий
    /// `lookup` создаст новый канал; уже полученные ссылки на старый
    /// продолжают работать, но он пуст.
    pub fn forget(
        &self,
        name: impl Into<ChannelName>,
    ) -> bool {
        let name = name.into();
        match self.table_for(&name).remove(&name) {
            Some((_, channel)) => {
                channel.clear();
                debug!(channel = %name, "channel forgotten");
                true
            }
            None => false,
        }
    }

    pub fn contains(
        &self,
        name: &ChannelName,
    ) -> bool {
        self.table_for(name).contains_key(name)
    }

    /// Снимок всех каналов, отсортированный по имени.
    pub fn channels(&self) -> Vec<Channel> {
        let mut all: Vec<Channel> = self
            .inner
            .exact
            .iter()
            .chain(self.inner.fuzzy.iter())
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Забывает все каналы.
    pub fn clear(&self) {
        for channel in self.channels() {
            channel.clear();
        }
        self.inner.exact.clear();
        self.inner.fuzzy.clear();
    }

    /// Каналы, чьи регистрации участвуют в отправке на `channel`.
    ///
    /// Первым всегда идёт сам канал, затем wildcard-канал (если он создан),
    /// затем подходящие шаблонные каналы в порядке имён.
    pub fn get_receivers(
        &self,
        channel: &Channel,
    ) -> Vec<Channel> {
        let mut receivers = vec![channel.clone()];
        if self.policy() == RouterPolicy::Simple {
            return receivers;
        }

        if channel.name().is_wildcard() {
            receivers.extend(self.channels().into_iter().filter(|c| c != channel));
            return receivers;
        }

        if let Some(wildcard) = self.inner.exact.get(&ChannelName::wildcard()) {
            receivers.push(wildcard.value().clone());
        }

        let mut fuzzy: Vec<Channel> = self
            .inner
            .fuzzy
            .iter()
            .filter(|entry| entry.key().fuzzy_matches(channel.name()))
            .map(|entry| entry.value().clone())
            .collect();
        fuzzy.sort_by(|a, b| a.name().cmp(b.name()));
        receivers.extend(fuzzy.into_iter().filter(|c| c != channel));

        receivers
    }

    /// Добавляет хук, выполняемый перед каждой отправкой (в порядке
    /// добавления, в потоке отправителя).
    pub fn add_before_fire<F>(
        &self,
        f: F,
    ) -> HookId
    where
        F: Fn(&Event, &ChannelName) + Send + Sync + 'static,
    {
        let id = self.next_hook_id();
        self.inner.hooks.write().before.push((id, Arc::new(f)));
        id
    }

    /// Добавляет хук, выполняемый после отправки. Завершение обработчиков к
    /// этому моменту гарантировано только для блокирующей отправки.
    pub fn add_after_fire<F>(
        &self,
        f: F,
    ) -> HookId
    where
        F: Fn(&Event, &ChannelName) + Send + Sync + 'static,
    {
        let id = self.next_hook_id();
        self.inner.hooks.write().after.push((id, Arc::new(f)));
        id
    }

    pub fn remove_hook(
        &self,
        id: HookId,
    ) -> bool {
        let mut hooks = self.inner.hooks.write();
        let before = hooks.before.len() + hooks.after.len();
        hooks.before.retain(|(h, _)| *h != id);
        hooks.after.retain(|(h, _)| *h != id);
        hooks.before.len() + hooks.after.len() != before
    }

    pub fn clear_hooks(&self) {
        let mut hooks = self.inner.hooks.write();
        hooks.before.clear();
        hooks.after.clear();
    }

    pub(crate) fn run_before_fire(
        &self,
        event: &Event,
        channel: &ChannelName,
    ) {
        let hooks: Vec<FireHook> = self
            .inner
            .hooks
            .read()
            .before
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for hook in hooks {
            hook(event, channel);
        }
    }

    pub(crate) fn run_after_fire(
        &self,
        event: &Event,
        channel: &ChannelName,
    ) {
        let hooks: Vec<FireHook> = self
            .inner
            .hooks
            .read()
            .after
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for hook in hooks {
            hook(event, channel);
        }
    }

    fn next_hook_id(&self) -> HookId {
        HookId(self.inner.next_hook.fetch_add(1, Ordering::Relaxed))
    }

    fn table_for(
        &self,
        name: &ChannelName,
    ) -> &DashMap<ChannelName, Channel> {
        if name.is_pattern() {
            &self.inner.fuzzy
        } else {
            &self.inner.exact
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(Hub::default())
    }
}

impl fmt::Debug for Router {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Router")
            .field("exact", &self.inner.exact.len())
            .field("fuzzy", &self.inner.fuzzy.len())
            .field("policy", &self.policy())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
