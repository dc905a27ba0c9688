use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Weak,
};

use dashmap::{mapref::entry::Entry, DashMap};
use once_cell::sync::Lazy;

/// Через столько новых вставок пул вычищается от мёртвых записей.
const SWEEP_EVERY: usize = 1024;

/// Пул для повторного использования `Arc<str>` по одинаковым именам каналов.
///
/// Пул держит только слабые ссылки: имя живёт, пока его держит хотя бы одно
/// `ChannelName`.
static CHANNEL_INTERN: Lazy<DashMap<Box<str>, Weak<str>>> = Lazy::new(DashMap::new);
static INSERTS: AtomicUsize = AtomicUsize::new(0);

/// Возвращает interned `Arc<str>` для данного имени канала.
///
/// Вставка идёт через `entry`, поэтому конкурентные первые вызовы для одного
/// имени получают один и тот же `Arc`.
#[inline]
pub(crate) fn intern_channel<S: AsRef<str>>(name: S) -> Arc<str> {
    let key = name.as_ref();
    if let Some(live) = CHANNEL_INTERN.get(key).and_then(|w| w.upgrade()) {
        return live;
    }

    let fresh = || {
        let name: Arc<str> = Arc::from(key);
        (Arc::downgrade(&name), name)
    };
    let (name, inserted) = match CHANNEL_INTERN.entry(Box::from(key)) {
        Entry::Occupied(mut entry) => match entry.get().upgrade() {
            Some(live) => (live, false),
            None => {
                let (weak, name) = fresh();
                entry.insert(weak);
                (name, true)
            }
        },
        Entry::Vacant(entry) => {
            let (weak, name) = fresh();
            entry.insert(weak);
            (name, true)
        }
    };

    if inserted && INSERTS.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
        sweep();
    }
    name
}

/// Удаляет записи, на которые больше никто не ссылается. Возвращает число
/// удалённых записей.
pub(crate) fn sweep() -> usize {
    let before = CHANNEL_INTERN.len();
    CHANNEL_INTERN.retain(|_, weak| weak.strong_count() > 0);
    before.saturating_sub(CHANNEL_INTERN.len())
}
