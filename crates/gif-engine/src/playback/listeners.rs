use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Called each time the last frame of a loop has been rendered.
pub trait AnimationListener: Send + Sync {
    fn on_animation_completed(&self);
}

impl<F: Fn() + Send + Sync> AnimationListener for F {
    fn on_animation_completed(&self) {
        self()
    }
}

/// Handle returned by [`ListenerSet::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Entry = (ListenerId, Arc<dyn AnimationListener>);

/// Registered completion listeners.
///
/// Notification iterates a snapshot, so listeners may add or remove
/// listeners (including themselves) from inside the callback.
#[derive(Clone, Default)]
pub struct ListenerSet {
    entries: Arc<Mutex<Vec<Entry>>>,
    next_id: Arc<AtomicU64>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn AnimationListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((id, listener));
        }
        id
    }

    /// Returns whether the listener was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self) {
        let snapshot: Vec<Arc<dyn AnimationListener>> = match self.entries.lock() {
            Ok(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => return,
        };
        for listener in snapshot {
            listener.on_animation_completed();
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ListenerSet({} listeners)", self.len())
    }
}
