//! Cooperative scheduling primitives for Tether.
//!
//! The marker-synchronization engines are built on two strictly-sequential
//! single-worker queues ([`SerialQueue`]) plus a shared timer runtime
//! ([`TimerPool`]) that drives single-shot, restartable debounce windows
//! ([`KeyedDebouncer`]). Nothing in this crate blocks the editing thread:
//! enqueueing and (re)starting a debounce are both non-blocking.

mod debouncer;
mod serial;
mod timer;

pub use debouncer::{KeyedDebouncedHandle, KeyedDebouncer};
pub use serial::SerialQueue;
pub use timer::TimerPool;

pub use tokio_util::sync::CancellationToken;

/// Marker type returned by cooperative tasks that observed cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;
