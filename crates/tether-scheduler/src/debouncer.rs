use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;

use tether_core::panic_payload_to_str;

use crate::{CancellationToken, Cancelled};

struct DebounceEntry {
    id: u64,
    token: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

struct DebouncerInner<K> {
    timer: tokio::runtime::Handle,
    delay: Duration,
    next_id: AtomicU64,
    entries: Mutex<HashMap<K, DebounceEntry>>,
}

/// A per-key, single-shot, restartable debounce.
///
/// Debouncing the same key again cancels the pending window and starts a new
/// one, so the action fires once the triggering events have quiesced for the
/// full delay. The action runs on the shared timer thread.
#[derive(Clone)]
pub struct KeyedDebouncer<K> {
    inner: Arc<DebouncerInner<K>>,
}

pub struct KeyedDebouncedHandle {
    token: CancellationToken,
}

impl KeyedDebouncedHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl<K> KeyedDebouncer<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(timer: tokio::runtime::Handle, delay: Duration) -> Self {
        Self {
            inner: Arc::new(DebouncerInner {
                timer,
                delay,
                next_id: AtomicU64::new(1),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    pub fn debounce<F>(&self, key: K, f: F) -> KeyedDebouncedHandle
    where
        F: FnOnce(CancellationToken) -> Result<(), Cancelled> + Send + 'static,
    {
        self.debounce_with_delay(key, self.inner.delay, f)
    }

    pub fn debounce_with_delay<F>(&self, key: K, delay: Duration, f: F) -> KeyedDebouncedHandle
    where
        F: FnOnce(CancellationToken) -> Result<(), Cancelled> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        if let Some(previous) = self.inner.entries.lock().remove(&key) {
            previous.token.cancel();
            previous.handle.abort();
        }

        let inner = Arc::clone(&self.inner);
        let key_for_task = key.clone();
        let token_for_task = token.clone();
        let mut f = Some(f);

        let handle = self.inner.timer.spawn(async move {
            tokio::select! {
                _ = token_for_task.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(f) = f.take() {
                        run_isolated(f, token_for_task.clone());
                    }
                }
            }

            let mut entries = inner.entries.lock();
            if let Some(current) = entries.get(&key_for_task) {
                if current.id == id {
                    entries.remove(&key_for_task);
                }
            }
        });

        self.inner.entries.lock().insert(
            key,
            DebounceEntry {
                id,
                token: token.clone(),
                handle,
            },
        );

        KeyedDebouncedHandle { token }
    }

    pub fn cancel(&self, key: &K) -> bool {
        let Some(entry) = self.inner.entries.lock().remove(key) else {
            return false;
        };
        entry.token.cancel();
        entry.handle.abort();
        true
    }
}

fn run_isolated<F>(f: F, token: CancellationToken)
where
    F: FnOnce(CancellationToken) -> Result<(), Cancelled>,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(token))) {
        Ok(Ok(())) | Ok(Err(Cancelled)) => {}
        Err(panic) => {
            let message = panic_payload_to_str(&*panic);
            tracing::error!(
                target = "tether.scheduler",
                panic = %message,
                "debounced task panicked"
            );
        }
    }
}
