//! Планировщик отложенных отправок.
//!
//! Записи хранятся в списке, отсортированном по времени. Один фоновый поток
//! спит до ближайшей записи; `add`, `refresh` и любые изменения записей
//! будят его, и он пересчитывает срок сна.

mod item;

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Instant,
};

pub use item::{ItemBuilder, TimeSchedulerItem};
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, trace};
use zvon_error::{bail, DispatchError, SchedulerError, ZvonResult};

use crate::hub::panic_message;

static GLOBAL_SCHEDULER: Lazy<TimeScheduler> = Lazy::new(TimeScheduler::default);

pub struct TimeScheduler {
    shared: Arc<SchedulerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    thread_name: String,
}

pub(crate) struct SchedulerShared {
    state: Mutex<SchedulerState>,
    wake: Condvar,
}

#[derive(Default)]
struct SchedulerState {
    items: Vec<TimeSchedulerItem>,
    stopped: bool,
}

impl SchedulerState {
    fn prune_and_sort(&mut self) {
        self.items.retain(|i| i.is_active());
        // Время записи может меняться из другого потока во время сортировки,
        // поэтому ключ снимается один раз на запись.
        self.items.sort_by_cached_key(|i| i.time());
    }
}

impl SchedulerShared {
    /// Будит фоновый поток. Блокировка берётся, чтобы сигнал не проскочил
    /// между проверкой и засыпанием.
    pub(crate) fn wake(&self) {
        let _state = self.state.lock();
        self.wake.notify_all();
    }
}

impl TimeScheduler {
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                state: Mutex::new(SchedulerState::default()),
                wake: Condvar::new(),
            }),
            worker: Mutex::new(None),
            thread_name: thread_name.into(),
        }
    }

    /// Планировщик процесса.
    pub fn global() -> &'static TimeScheduler {
        &GLOBAL_SCHEDULER
    }

    /// Добавляет запись. Выключенные записи сразу отбрасываются.
    pub fn add(
        &self,
        item: TimeSchedulerItem,
    ) -> ZvonResult<TimeSchedulerItem> {
        {
            let mut state = self.shared.state.lock();
            if state.stopped {
                bail!(SchedulerError::Stopped);
            }
            item.attach(&self.shared);
            state.items.push(item.clone());
            state.prune_and_sort();
            self.shared.wake.notify_all();
        }
        trace!(channel = %item.channel().name(), "item scheduled");

        self.ensure_worker()?;
        Ok(item)
    }

    /// Строит запись и добавляет её.
    pub fn schedule(
        &self,
        builder: ItemBuilder,
    ) -> ZvonResult<TimeSchedulerItem> {
        self.add(builder.build()?)
    }

    /// Активные записи в порядке времени.
    pub fn list(&self) -> Vec<TimeSchedulerItem> {
        let mut state = self.shared.state.lock();
        state.prune_and_sort();
        state.items.clone()
    }

    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        state.items.clear();
        self.shared.wake.notify_all();
    }

    /// Заставляет фоновый поток пересчитать срок сна. Нужен после изменения
    /// записи в обход её методов.
    pub fn refresh(&self) {
        self.shared.wake();
    }

    /// Останавливает фоновый поток. Последующие `add` вернут ошибку.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.stopped = true;
            self.shared.wake.notify_all();
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                debug!("scheduler worker exited with panic");
            }
        }
    }

    fn ensure_worker(&self) -> ZvonResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-scheduler", self.thread_name))
            .spawn(move || run(shared))
            .map_err(|e| DispatchError::SpawnFailed {
                reason: e.to_string(),
            })?;
        *worker = Some(handle);
        Ok(())
    }
}

/// Цикл фонового потока.
fn run(shared: Arc<SchedulerShared>) {
    debug!("scheduler worker started");
    let mut state = shared.state.lock();

    loop {
        if state.stopped {
            break;
        }

        state.prune_and_sort();
        let now = Instant::now();
        let due: Vec<TimeSchedulerItem> = state
            .items
            .iter()
            .filter(|i| i.is_ready_at(now))
            .cloned()
            .collect();

        if !due.is_empty() {
            MutexGuard::unlocked(&mut state, || {
                for item in &due {
                    // Паника хука или обработчика не должна останавливать поток.
                    if let Err(payload) =
                        panic::catch_unwind(AssertUnwindSafe(|| item.fire_if_ready()))
                    {
                        error!(
                            channel = %item.channel().name(),
                            panic = %panic_message(payload.as_ref()),
                            "scheduled fire panicked"
                        );
                    }
                }
            });
            continue;
        }

        // Список уже отсортирован, ближайшая запись первая.
        match state.items.first().map(TimeSchedulerItem::time) {
            Some(deadline) => {
                shared.wake.wait_until(&mut state, deadline);
            }
            None => shared.wake.wait(&mut state),
        }
    }

    debug!("scheduler worker stopped");
}

impl Default for TimeScheduler {
    fn default() -> Self {
        Self::new("zvon")
    }
}

impl Drop for TimeScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for TimeScheduler {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TimeScheduler")
            .field("items", &state.items.len())
            .field("stopped", &state.stopped)
            .field("running", &self.worker.lock().is_some())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
