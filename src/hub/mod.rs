//! Хаб: запуск обработчиков и ограничение параллелизма.
//!
//! Каждая параллельная задача получает свой поток. Когда число живых задач
//! достигает `max_children`, новые задачи не отклоняются, а откладываются в
//! очередь (neglect). Завершившаяся неблокирующая задача сразу поднимает из
//! очереди следующую, так что очередь разбирается цепочкой.

mod task;

use std::{
    any::Any,
    collections::{HashSet, VecDeque},
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex, RwLock};
pub use task::{FireTrace, HandlerFailure, Spawned, Task, TaskHandle};
use task::Completion;
use tracing::{debug, error, trace, warn};
use zvon_error::{DispatchError, LogLevel, StackError};

/// Хук отложенной задачи: задача и длина очереди после добавления.
pub type NeglectHook = Arc<dyn Fn(&Task, usize) + Send + Sync>;
/// Хук задачи, поднятой из очереди.
pub type NeglectDoneHook = Arc<dyn Fn(&Task) + Send + Sync>;
/// Хук ошибки обработчика.
pub type ExceptionHook = Arc<dyn Fn(&HandlerFailure) + Send + Sync>;

static GLOBAL_HUB: Lazy<Hub> = Lazy::new(|| Hub::new(HubConfig::default()));

/// Настройки хаба.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// `None` — без ограничения.
    pub max_children: Option<usize>,
    /// Префикс имён потоков задач.
    pub thread_name: String,
    /// Снимать ли полный backtrace на каждом `fire`.
    pub capture_backtrace: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_children: None,
            thread_name: "zvon".to_string(),
            capture_backtrace: false,
        }
    }
}

/// Диспетчер задач. Клоны разделяют одно состояние.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    state: Mutex<HubState>,
    idle: Condvar,
    hooks: RwLock<HubHooks>,
    thread_name: String,
    capture_backtrace: bool,
}

struct HubState {
    children: HashSet<u64>,
    neglected: VecDeque<Task>,
    max_children: Option<usize>,
    held: usize,
    next_id: u64,
}

impl HubState {
    fn at_capacity(&self) -> bool {
        self.max_children
            .is_some_and(|max| self.children.len() >= max)
    }

    /// Занимает слот. Проверка ёмкости и занятие слота делаются под одной
    /// блокировкой.
    fn admit(&mut self) -> u64 {
        self.next_id += 1;
        self.children.insert(self.next_id);
        self.next_id
    }
}

struct HubHooks {
    on_neglect: NeglectHook,
    on_neglect_done: NeglectDoneHook,
    on_handler_exception: ExceptionHook,
}

impl Default for HubHooks {
    fn default() -> Self {
        Self {
            on_neglect: default_on_neglect(),
            on_neglect_done: default_on_neglect_done(),
            on_handler_exception: default_on_handler_exception(),
        }
    }
}

fn default_on_neglect() -> NeglectHook {
    Arc::new(|task, queued| {
        warn!(
            channel = %task.channel,
            event_type = %task.event.event_type(),
            handler = task.handler.id(),
            neglected = queued,
            "hub at capacity, task neglected"
        );
    })
}

fn default_on_neglect_done() -> NeglectDoneHook {
    Arc::new(|task| {
        debug!(
            channel = %task.channel,
            event_type = %task.event.event_type(),
            handler = task.handler.id(),
            "neglected task resumed"
        );
    })
}

fn default_on_handler_exception() -> ExceptionHook {
    Arc::new(|failure| {
        let err = &failure.error;
        let thread = failure.trace.thread.as_deref().unwrap_or("<unnamed>");
        match err.log_level() {
            LogLevel::Error => error!(
                channel = %failure.channel,
                event = %failure.event,
                handler = failure.handler_id,
                fired_at = %failure.trace.location,
                thread,
                code = %err.status_code(),
                tags = ?err.metrics_tags(),
                error = %err,
                "event handler failed"
            ),
            _ => warn!(
                channel = %failure.channel,
                event = %failure.event,
                handler = failure.handler_id,
                fired_at = %failure.trace.location,
                thread,
                code = %err.status_code(),
                error = %err,
                "event handler failed"
            ),
        }
        if let Some(bt) = &failure.trace.backtrace {
            error!("fire backtrace:\n{bt}");
        }
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(HubState {
                    children: HashSet::new(),
                    neglected: VecDeque::new(),
                    max_children: config.max_children,
                    held: 0,
                    next_id: 0,
                }),
                idle: Condvar::new(),
                hooks: RwLock::new(HubHooks::default()),
                thread_name: config.thread_name,
                capture_backtrace: config.capture_backtrace,
            }),
        }
    }

    /// Хаб процесса, общий для глобального маршрутизатора и планировщика.
    pub fn global() -> &'static Hub {
        &GLOBAL_HUB
    }

    pub fn max_children(&self) -> Option<usize> {
        self.inner.state.lock().max_children
    }

    pub fn set_max_children(
        &self,
        max: Option<usize>,
    ) {
        self.inner.state.lock().max_children = max;
    }

    pub fn captures_backtrace(&self) -> bool {
        self.inner.capture_backtrace
    }

    /// Число задач, которые сейчас выполняются.
    pub fn children_count(&self) -> usize {
        self.inner.state.lock().children.len()
    }

    pub fn neglected_count(&self) -> usize {
        self.inner.state.lock().neglected.len()
    }

    /// Выполняет задачу.
    ///
    /// Непараллельная задача выполняется сразу в текущем потоке. Параллельная
    /// получает свой поток, если есть свободный слот и хаб не удерживается
    /// через [`Hub::hold`]; иначе откладывается.
    pub fn spawn(
        &self,
        task: Task,
    ) -> Spawned {
        if !task.parallel {
            self.run(&task);
            return Spawned::Inline;
        }

        let admitted = {
            let mut state = self.inner.state.lock();
            if state.held > 0 || state.at_capacity() {
                state.neglected.push_back(task.clone());
                Err(state.neglected.len())
            } else {
                Ok(state.admit())
            }
        };

        match admitted {
            Ok(id) => self.start(id, task),
            Err(queued) => {
                let hook = self.inner.hooks.read().on_neglect.clone();
                guarded("on_neglect", || hook(&task, queued));
                Spawned::Neglected
            }
        }
    }

    /// Запускает произвольную работу в отдельном потоке. Такие задачи
    /// учитываются в `join_children`, но не ограничиваются `max_children`.
    pub fn spawn_detached<F>(
        &self,
        job: F,
    ) -> Spawned
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.inner.state.lock().admit();
        let slot = Arc::new(Mutex::new(Some(job)));
        let taken = slot.clone();

        let launched = self.launch(id, false, move || {
            let job = taken.lock().take();
            if let Some(job) = job {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    error!(
                        panic = %panic_message(payload.as_ref()),
                        "detached hub task panicked"
                    );
                }
            }
        });

        match launched {
            Ok(handle) => Spawned::Running(handle),
            Err(e) => {
                self.release(id);
                warn!(error = %e, "failed to start detached task, running inline");
                let job = slot.lock().take();
                if let Some(job) = job {
                    guarded("detached task", job);
                }
                Spawned::Inline
            }
        }
    }

    /// Пока выполняется `f`, все параллельные задачи откладываются. После
    /// выхода из внешнего `hold` очередь запускается целиком.
    pub fn hold<R>(
        &self,
        f: impl FnOnce() -> R,
    ) -> R {
        struct HoldGuard<'a>(&'a Hub);

        impl Drop for HoldGuard<'_> {
            fn drop(&mut self) {
                let released = {
                    let mut state = self.0.inner.state.lock();
                    state.held = state.held.saturating_sub(1);
                    state.held == 0
                };
                if released {
                    self.0.flush_neglected();
                }
            }
        }

        self.inner.state.lock().held += 1;
        let _guard = HoldGuard(self);
        f()
    }

    /// Запускает все отложенные задачи как новые неблокирующие, не глядя на
    /// `max_children`. Возвращает их количество.
    pub fn flush_neglected(&self) -> usize {
        let admitted: Vec<(u64, Task)> = {
            let mut state = self.inner.state.lock();
            let tasks: Vec<Task> = state.neglected.drain(..).collect();
            tasks.into_iter().map(|t| (state.admit(), t)).collect()
        };

        let count = admitted.len();
        for (id, task) in admitted {
            self.resume(id, task);
        }
        count
    }

    /// Ждёт, пока не останется ни одной выполняющейся задачи, включая
    /// запущенные во время ожидания.
    pub fn join_children(&self) {
        let mut state = self.inner.state.lock();
        while !state.children.is_empty() {
            self.inner.idle.wait(&mut state);
        }
    }

    pub fn set_on_neglect<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Task, usize) + Send + Sync + 'static,
    {
        self.inner.hooks.write().on_neglect = Arc::new(f);
    }

    pub fn set_on_neglect_done<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Task) + Send + Sync + 'static,
    {
        self.inner.hooks.write().on_neglect_done = Arc::new(f);
    }

    pub fn set_on_handler_exception<F>(
        &self,
        f: F,
    ) where
        F: Fn(&HandlerFailure) + Send + Sync + 'static,
    {
        self.inner.hooks.write().on_handler_exception = Arc::new(f);
    }

    pub fn reset_on_neglect(&self) {
        self.inner.hooks.write().on_neglect = default_on_neglect();
    }

    pub fn reset_on_neglect_done(&self) {
        self.inner.hooks.write().on_neglect_done = default_on_neglect_done();
    }

    pub fn reset_on_handler_exception(&self) {
        self.inner.hooks.write().on_handler_exception = default_on_handler_exception();
    }

    pub fn reset_hooks(&self) {
        *self.inner.hooks.write() = HubHooks::default();
    }

    fn start(
        &self,
        id: u64,
        task: Task,
    ) -> Spawned {
        let hub = self.clone();
        let job_task = task.clone();
        let launched = self.launch(id, !task.blocking, move || hub.run(&job_task));

        match launched {
            Ok(handle) => {
                trace!(task_id = id, channel = %task.channel, "hub task started");
                Spawned::Running(handle)
            }
            Err(e) => {
                self.release(id);
                error!(
                    error = %DispatchError::SpawnFailed { reason: e.to_string() },
                    channel = %task.channel,
                    "task moved to neglect queue"
                );
                let queued = {
                    let mut state = self.inner.state.lock();
                    state.neglected.push_back(task.clone());
                    state.neglected.len()
                };
                let hook = self.inner.hooks.read().on_neglect.clone();
                guarded("on_neglect", || hook(&task, queued));
                Spawned::Neglected
            }
        }
    }

    fn launch<F>(
        &self,
        id: u64,
        promote: bool,
        job: F,
    ) -> std::io::Result<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let done = Arc::new(Completion::default());
        let handle = TaskHandle::new(id, done.clone());
        let hub = self.clone();

        thread::Builder::new()
            .name(format!("{}-hub-{id}", self.inner.thread_name))
            .spawn(move || {
                job();
                hub.finish(id, promote);
                done.complete();
            })?;

        Ok(handle)
    }

    /// Освобождает слот и, если разрешено, сразу занимает его следующей
    /// отложенной задачей.
    fn finish(
        &self,
        id: u64,
        promote: bool,
    ) {
        let next = {
            let mut state = self.inner.state.lock();
            state.children.remove(&id);
            let next = if promote && state.held == 0 && !state.at_capacity() {
                state
                    .neglected
                    .pop_front()
                    .map(|task| (state.admit(), task))
            } else {
                None
            };
            self.inner.idle.notify_all();
            next
        };

        if let Some((id, task)) = next {
            self.resume(id, task);
        }
    }

    fn release(
        &self,
        id: u64,
    ) {
        let mut state = self.inner.state.lock();
        state.children.remove(&id);
        self.inner.idle.notify_all();
    }

    fn resume(
        &self,
        id: u64,
        mut task: Task,
    ) {
        task.blocking = false;
        let hook = self.inner.hooks.read().on_neglect_done.clone();
        guarded("on_neglect_done", || hook(&task));
        self.start(id, task);
    }

    /// Вызывает обработчик. Ошибка или паника уходят в хук и дальше не идут.
    fn run(
        &self,
        task: &Task,
    ) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            task.handler.call(&task.event, &task.channel)
        }));

        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => DispatchError::HandlerFailed {
                reason: format!("{e:#}"),
            },
            Err(payload) => DispatchError::HandlerPanicked {
                message: panic_message(payload.as_ref()),
            },
        };

        let failure = HandlerFailure {
            event: task.event.clone(),
            channel: task.channel.clone(),
            handler_id: task.handler.id(),
            error: StackError::new(error).context_at(
                format!("fire {} on {}", task.event.event_type(), task.channel),
                task.trace.location,
            ),
            trace: task.trace.clone(),
        };

        let hook = self.inner.hooks.read().on_handler_exception.clone();
        guarded("on_handler_exception", || hook(&failure));
    }
}

/// Хуки пользовательские, их паника не должна ронять поток хаба.
fn guarded(
    what: &str,
    f: impl FnOnce(),
) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        error!(hook = what, panic = %panic_message(payload.as_ref()), "hub hook panicked");
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl fmt::Debug for Hub {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Hub")
            .field("children", &state.children.len())
            .field("neglected", &state.neglected.len())
            .field("max_children", &state.max_children)
            .field("held", &(state.held > 0))
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
