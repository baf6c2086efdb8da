//! Synchronous subscriber registry.
//!
//! Change events in Tether are fanned out on the mutating thread, in
//! subscription order, so position tracking observes every edit before any
//! later read of the document. Callbacks run outside the registry lock;
//! a callback may subscribe or unsubscribe without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Handle returned by [`Subscribers::subscribe`]; pass it back to
/// [`Subscribers::unsubscribe`] to remove the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub struct Subscribers<E> {
    inner: Mutex<Vec<(SubscriptionId, Callback<E>)>>,
    next_id: AtomicU64,
}

impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E> Subscribers<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock_inner().push((id, Arc::new(callback)));
        id
    }

    /// Removes a callback. Unknown ids are ignored so teardown paths can be
    /// unconditional.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.lock_inner().retain(|(sub, _)| *sub != id);
    }

    /// Invokes every callback with `event`, in subscription order.
    pub fn emit(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self
            .lock_inner()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock_inner().is_empty()
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Callback<E>)>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> std::fmt::Debug for Subscribers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.lock_inner().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn emits_in_subscription_order() {
        let subs: Subscribers<u32> = Subscribers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            subs.subscribe(move |event: &u32| {
                seen.lock().unwrap().push((tag, *event));
            });
        }

        subs.emit(&7);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[("a", 7), ("b", 7), ("c", 7)]
        );
    }

    #[test]
    fn unsubscribe_removes_callback() {
        let subs: Subscribers<()> = Subscribers::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_for_cb = Arc::clone(&calls);
        let id = subs.subscribe(move |_| {
            calls_for_cb.fetch_add(1, Ordering::SeqCst);
        });

        subs.emit(&());
        subs.unsubscribe(id);
        subs.emit(&());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let subs: Arc<Subscribers<()>> = Arc::new(Subscribers::new());
        let id_slot = Arc::new(Mutex::new(None::<SubscriptionId>));

        let subs_for_cb = Arc::clone(&subs);
        let id_for_cb = Arc::clone(&id_slot);
        let id = subs.subscribe(move |_| {
            if let Some(id) = *id_for_cb.lock().unwrap() {
                subs_for_cb.unsubscribe(id);
            }
        });
        *id_slot.lock().unwrap() = Some(id);

        subs.emit(&());
        assert!(subs.is_empty());
    }
}
