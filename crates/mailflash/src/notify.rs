//! Dispatch notifications.
//!
//! Every message handed to a [`Connection`](crate::Connection) is announced
//! through the service's [`DispatchNotifier`], whether or not it was actually
//! transmitted. Tests subscribe to capture outgoing mail.

use crate::config::MailConfig;
use crate::message::Message;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A message that was just dispatched.
#[derive(Debug, Clone, Copy)]
pub struct Dispatch<'a> {
    /// The message as it was sent.
    pub message: &'a Message,
    /// Configuration of the sending service.
    pub config: &'a MailConfig,
}

/// Handle returned by [`DispatchNotifier::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Dispatch<'_>) + Send + Sync>;

#[derive(Default)]
struct Registry {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

/// Listener registry for dispatch events.
///
/// Cloning shares the registry. Listeners run synchronously, in
/// registration order, on the sending task.
#[derive(Clone, Default)]
pub struct DispatchNotifier {
    inner: Arc<Registry>,
}

impl DispatchNotifier {
    /// Creates a notifier with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener until [`disconnect`](Self::disconnect) is called.
    pub fn connect<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Dispatch<'_>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn disconnect(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Registers a listener for as long as the returned guard lives.
    #[must_use = "the listener is removed when the subscription is dropped"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Dispatch<'_>) + Send + Sync + 'static,
    {
        Subscription {
            notifier: self.clone(),
            id: self.connect(listener),
        }
    }

    /// Announces a dispatch to every listener.
    pub fn send(&self, dispatch: &Dispatch<'_>) {
        // Call outside the lock so listeners may (un)subscribe
        let listeners: Vec<Listener> = self
            .listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(dispatch);
        }
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.listeners().len()
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DispatchNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchNotifier")
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

/// Keeps a listener registered; disconnects it on drop.
#[derive(Debug)]
pub struct Subscription {
    notifier: DispatchNotifier,
    id: ListenerId,
}

impl Subscription {
    /// Returns the listener id.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.notifier.disconnect(self.id);
    }
}
