use hw_protocol::ServerMessage;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Listener = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Entries {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

/// Notification callbacks, invoked in registration order.
#[derive(Clone, Default)]
pub(crate) struct ListenerRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        let mut entries = self.lock();
        entries.next_id += 1;
        let id = ListenerId(entries.next_id);
        entries.listeners.push((id, Arc::new(listener)));
        Subscription {
            id,
            entries: Arc::downgrade(&self.entries),
        }
    }

    /// Delivers `msg` to every listener registered when the call started.
    ///
    /// The lock is released before any listener runs, so listeners may
    /// subscribe or unsubscribe freely; such changes apply from the next
    /// message on.
    pub fn dispatch(&self, msg: &ServerMessage) -> usize {
        let snapshot: Vec<Listener> = self
            .lock()
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in &snapshot {
            listener(msg);
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned by [`BackendLink::on_message`](crate::BackendLink::on_message).
///
/// Dropping it does not remove the listener; call [`Subscription::unsubscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    id: ListenerId,
    entries: Weak<Mutex<Entries>>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns false if the listener was already removed.
    pub fn unsubscribe(&self) -> bool {
        let Some(entries) = self.entries.upgrade() else {
            return false;
        };
        let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.listeners.len();
        entries.listeners.retain(|(id, _)| *id != self.id);
        entries.listeners.len() != before
    }
}
