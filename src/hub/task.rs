use std::{backtrace::Backtrace, fmt, panic::Location, sync::Arc, thread, time::Duration};

use parking_lot::{Condvar, Mutex};
use zvon_error::StackError;

use crate::{
    channel::{ChannelName, Handler},
    event::Event,
};

/// Место, откуда было вызвано `fire`.
///
/// Прикрепляется к каждой задаче и попадает в контекст ошибки обработчика.
#[derive(Clone)]
pub struct FireTrace {
    pub location: &'static Location<'static>,
    pub thread: Option<String>,
    pub backtrace: Option<Arc<Backtrace>>,
}

impl FireTrace {
    pub fn capture(
        location: &'static Location<'static>,
        with_backtrace: bool,
    ) -> Self {
        Self {
            location,
            thread: thread::current().name().map(str::to_string),
            backtrace: with_backtrace.then(|| Arc::new(Backtrace::force_capture())),
        }
    }

    /// Трасса для вызовов, не прошедших через `Channel::fire`.
    #[track_caller]
    pub fn here() -> Self {
        Self::capture(Location::caller(), false)
    }
}

impl fmt::Debug for FireTrace {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("FireTrace")
            .field("location", &format_args!("{}", self.location))
            .field("thread", &self.thread)
            .field("backtrace", &self.backtrace.is_some())
            .finish()
    }
}

/// Единица работы хаба: один обработчик для одного события.
#[derive(Clone, Debug)]
pub struct Task {
    pub event: Event,
    /// Канал, на котором событие было отправлено.
    pub channel: ChannelName,
    pub handler: Handler,
    pub blocking: bool,
    pub parallel: bool,
    pub trace: FireTrace,
}

/// Ошибка обработчика вместе с тем, что её вызвало.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub event: Event,
    pub channel: ChannelName,
    pub handler_id: u64,
    pub error: StackError,
    pub trace: FireTrace,
}

#[derive(Default)]
pub(crate) struct Completion {
    finished: Mutex<bool>,
    cv: Condvar,
}

impl Completion {
    pub(crate) fn complete(&self) {
        *self.finished.lock() = true;
        self.cv.notify_all();
    }
}

/// Ручка запущенной задачи.
///
/// Ожидание собственной задачи изнутри неё же заблокирует поток навсегда.
#[derive(Clone)]
pub struct TaskHandle {
    id: u64,
    done: Arc<Completion>,
}

impl TaskHandle {
    pub(crate) fn new(
        id: u64,
        done: Arc<Completion>,
    ) -> Self {
        Self { id, done }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        *self.done.finished.lock()
    }

    /// Ждёт завершения задачи.
    pub fn join(&self) {
        let mut finished = self.done.finished.lock();
        while !*finished {
            self.done.cv.wait(&mut finished);
        }
    }

    /// Ждёт не дольше `timeout`; возвращает `true`, если задача завершилась.
    pub fn join_timeout(
        &self,
        timeout: Duration,
    ) -> bool {
        let Some(deadline) = std::time::Instant::now().checked_add(timeout) else {
            self.join();
            return true;
        };
        let mut finished = self.done.finished.lock();
        while !*finished {
            if self.done.cv.wait_until(&mut finished, deadline).timed_out() {
                return *finished;
            }
        }
        true
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Результат `Hub::spawn`.
#[derive(Debug, Clone)]
pub enum Spawned {
    /// Обработчик уже выполнен в потоке вызывающего.
    Inline,
    /// Запущена отдельная задача.
    Running(TaskHandle),
    /// Задача отложена (нет свободных слотов или хаб в `hold`).
    Neglected,
}

impl Spawned {
    pub fn handle(&self) -> Option<&TaskHandle> {
        match self {
            Self::Running(h) => Some(h),
            _ => None,
        }
    }

    pub fn is_neglected(&self) -> bool {
        matches!(self, Self::Neglected)
    }

    /// Ждёт задачу, если она запущена; для остальных вариантов ничего не
    /// делает.
    pub fn join(&self) {
        if let Self::Running(h) = self {
            h.join();
        }
    }
}
