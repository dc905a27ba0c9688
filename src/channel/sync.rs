use std::{
    collections::VecDeque,
    sync::Arc,
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use zvon_error::ZvonResult;

use super::{Channel, ChannelName, Handler};
use crate::event::{Event, EventSpec};

type Condition = Box<dyn Fn(&Event, &ChannelName) -> bool + Send>;
type Execution = Box<dyn FnMut(&Event, &ChannelName) + Send>;

struct Inbox {
    queue: Mutex<VecDeque<(Event, ChannelName)>>,
    arrived: Condvar,
    owner: ThreadId,
}

impl Inbox {
    fn push(
        &self,
        event: Event,
        channel: ChannelName,
    ) {
        self.queue.lock().push_back((event, channel));
        // Из собственного потока никто не ждёт: владелец сейчас выполняет
        // свой блок, а не `wait`.
        if thread::current().id() != self.owner {
            self.arrived.notify_all();
        }
    }
}

/// Помощник внутри [`Channel::sync_on`].
///
/// Копит подходящие события с момента создания; `wait` достаёт их по
/// очереди, отбрасывая те, что не прошли условия. Временный обработчик
/// снимается при уничтожении помощника.
pub struct SyncHelper {
    inbox: Arc<Inbox>,
    handler: Handler,
    conditions: Vec<Condition>,
    executions: Vec<Execution>,
    timeout: Option<Duration>,
    waited: bool,
    last: Option<Event>,
}

impl SyncHelper {
    pub(super) fn attach(
        channel: &Channel,
        patterns: impl Into<EventSpec>,
        timeout: Option<Duration>,
    ) -> ZvonResult<Self> {
        let inbox = Arc::new(Inbox {
            queue: Mutex::new(VecDeque::new()),
            arrived: Condvar::new(),
            owner: thread::current().id(),
        });

        let sink = inbox.clone();
        let handler = channel.register(patterns, move |event, name| {
            sink.push(event.clone(), name.clone());
            Ok(())
        })?;

        Ok(Self {
            inbox,
            handler,
            conditions: Vec::new(),
            executions: Vec::new(),
            timeout,
            waited: false,
            last: None,
        })
    }

    /// Добавляет условие; событие принимается, только если все условия
    /// истинны.
    pub fn condition<F>(
        &mut self,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&Event, &ChannelName) -> bool + Send + 'static,
    {
        self.conditions.push(Box::new(f));
        self
    }

    /// Добавляет действие, выполняемое при успешном ожидании (в порядке
    /// добавления), до возврата события.
    pub fn execute<F>(
        &mut self,
        f: F,
    ) -> &mut Self
    where
        F: FnMut(&Event, &ChannelName) + Send + 'static,
    {
        self.executions.push(Box::new(f));
        self
    }

    /// Ждёт с таймаутом по умолчанию.
    pub fn wait(&mut self) -> Option<Event> {
        self.wait_for(self.timeout)
    }

    /// Ждёт следующее подходящее событие не дольше `timeout`
    /// (`None` — без ограничения).
    pub fn wait_for(
        &mut self,
        timeout: Option<Duration>,
    ) -> Option<Event> {
        self.waited = true;
        // Непредставимый срок равносилен ожиданию без ограничения.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let found = {
            let mut queue = self.inbox.queue.lock();
            loop {
                if let Some((event, name)) = queue.pop_front() {
                    if self.conditions.iter().all(|c| c(&event, &name)) {
                        break Some((event, name));
                    }
                    continue;
                }

                match deadline {
                    Some(deadline) => {
                        if self.inbox.arrived.wait_until(&mut queue, deadline).timed_out()
                            && queue.is_empty()
                        {
                            break None;
                        }
                    }
                    None => self.inbox.arrived.wait(&mut queue),
                }
            }
        };

        self.last = found.map(|(event, name)| {
            for exec in self.executions.iter_mut() {
                exec(&event, &name);
            }
            event
        });
        self.last.clone()
    }

    /// Количество накопленных, ещё не разобранных событий.
    pub fn pending(&self) -> usize {
        self.inbox.queue.lock().len()
    }

    pub(super) fn has_waited(&self) -> bool {
        self.waited
    }

    pub(super) fn into_result(mut self) -> Option<Event> {
        self.last.take()
    }
}

impl Drop for SyncHelper {
    fn drop(&mut self) {
        self.handler.unregister_everywhere();
    }
}
