use tokio::runtime::Runtime;

/// One shared timer runtime for the whole subsystem.
///
/// Debounce windows all sleep on this runtime's single worker thread; the
/// thread is also where the debounced actions run once a window elapses.
pub struct TimerPool {
    runtime: Option<Runtime>,
    handle: tokio::runtime::Handle,
}

impl TimerPool {
    pub fn new() -> Self {
        let runtime = build_timer_runtime();
        let handle = runtime.handle().clone();
        Self {
            runtime: Some(runtime),
            handle,
        }
    }

    /// Build a pool that reuses an existing Tokio runtime for timers.
    ///
    /// This is useful when the embedder already runs inside a Tokio runtime
    /// (e.g. in a `#[tokio::main]` binary) and we want to avoid spawning an
    /// extra timer thread.
    pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
        Self {
            runtime: None,
            handle,
        }
    }

    pub fn handle(&self) -> tokio::runtime::Handle {
        self.handle.clone()
    }
}

fn build_timer_runtime() -> Runtime {
    // Thread creation can fail in constrained CI/sandbox environments (e.g.
    // low RLIMIT_NPROC or `EAGAIN`); degrade rather than crash during startup.
    match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_time()
        .thread_name("tether-timer")
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            // Best-effort fall back to a current-thread runtime, which should
            // be able to start even when thread creation is temporarily
            // unavailable.
            tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap_or_else(|_| panic!("failed to build timer runtime: {err}"))
        }
    }
}

impl Default for TimerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for TimerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerPool")
            .field("owns_runtime", &self.runtime.is_some())
            .finish()
    }
}
