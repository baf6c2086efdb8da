use std::collections::HashMap;

use parking_lot::Mutex;

use tether_core::{Line, Subscribers, SubscriptionId};
use tether_vfs::DocPath;

use crate::breakpoint::{Breakpoint, BreakpointId, BreakpointKind, Validity};

/// Who moved a line breakpoint.
///
/// Tether's own write-backs are tagged [`LineChangeSource::Internal`] so the
/// line tracker can pattern-match them away instead of re-interpreting its
/// own update as an external relocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChangeSource {
    Internal,
    External,
}

/// Property-granular description of what changed on a breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointChange {
    Added,
    Removed,
    Line {
        source: LineChangeSource,
        line: Line,
    },
    Path {
        from: DocPath,
        to: DocPath,
    },
    Enabled(bool),
    Validity,
    Condition,
    HitCountFilter,
    Hidden(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointEvent {
    pub id: BreakpointId,
    pub change: BreakpointChange,
}

/// The table of live breakpoints plus change notification fan-out.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    inner: Mutex<RegistryInner>,
    subscribers: Subscribers<BreakpointEvent>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    breakpoints: HashMap<BreakpointId, Breakpoint>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&BreakpointEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.unsubscribe(id);
    }

    pub fn add(&self, breakpoint: Breakpoint) -> BreakpointId {
        let id = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let id = BreakpointId::from_raw(inner.next_id);
            inner.breakpoints.insert(id, breakpoint);
            id
        };
        self.emit(id, BreakpointChange::Added);
        id
    }

    pub fn remove(&self, id: BreakpointId) {
        let removed = self.inner.lock().breakpoints.remove(&id).is_some();
        if removed {
            self.emit(id, BreakpointChange::Removed);
        }
    }

    pub fn get(&self, id: BreakpointId) -> Option<Breakpoint> {
        self.inner.lock().breakpoints.get(&id).cloned()
    }

    pub fn contains(&self, id: BreakpointId) -> bool {
        self.inner.lock().breakpoints.contains_key(&id)
    }

    /// All live breakpoints, in id order.
    pub fn snapshot(&self) -> Vec<(BreakpointId, Breakpoint)> {
        let mut all: Vec<(BreakpointId, Breakpoint)> = self
            .inner
            .lock()
            .breakpoints
            .iter()
            .map(|(id, bp)| (*id, bp.clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    /// Moves the stored line of a line breakpoint on behalf of the user or
    /// the embedder's properties UI.
    pub fn set_line(&self, id: BreakpointId, line: Line) {
        self.set_line_from(id, line, LineChangeSource::External);
    }

    /// Moves the stored line on behalf of Tether's own re-anchoring path.
    pub fn set_line_internal(&self, id: BreakpointId, line: Line) {
        self.set_line_from(id, line, LineChangeSource::Internal);
    }

    fn set_line_from(&self, id: BreakpointId, line: Line, source: LineChangeSource) {
        let changed = {
            let mut inner = self.inner.lock();
            let Some(bp) = inner.breakpoints.get_mut(&id) else {
                return;
            };
            match &mut bp.kind {
                BreakpointKind::Line(location) if location.line != line => {
                    location.line = line;
                    true
                }
                BreakpointKind::Line(_) => false,
                _ => {
                    tracing::debug!(
                        target = "tether.breakpoints",
                        id = id.to_raw(),
                        "set_line on a non-line breakpoint; ignored"
                    );
                    false
                }
            }
        };
        if changed {
            self.emit(id, BreakpointChange::Line { source, line });
        }
    }

    /// Moves a line breakpoint to a different document.
    pub fn set_path(&self, id: BreakpointId, to: DocPath) {
        let from = {
            let mut inner = self.inner.lock();
            let Some(bp) = inner.breakpoints.get_mut(&id) else {
                return;
            };
            match &mut bp.kind {
                BreakpointKind::Line(location) if location.path != to => {
                    let from = std::mem::replace(&mut location.path, to.clone());
                    Some(from)
                }
                _ => None,
            }
        };
        if let Some(from) = from {
            self.emit(id, BreakpointChange::Path { from, to });
        }
    }

    pub fn set_enabled(&self, id: BreakpointId, enabled: bool) {
        let changed = self.update(id, |bp| {
            let changed = bp.enabled != enabled;
            bp.enabled = enabled;
            changed
        });
        if changed {
            self.emit(id, BreakpointChange::Enabled(enabled));
        }
    }

    pub fn set_validity(&self, id: BreakpointId, validity: Validity) {
        let changed = self.update(id, |bp| {
            let changed = bp.validity != validity;
            bp.validity = validity.clone();
            changed
        });
        if changed {
            self.emit(id, BreakpointChange::Validity);
        }
    }

    pub fn set_condition(&self, id: BreakpointId, condition: Option<String>) {
        let changed = self.update(id, |bp| {
            let changed = bp.condition != condition;
            bp.condition = condition.clone();
            changed
        });
        if changed {
            self.emit(id, BreakpointChange::Condition);
        }
    }

    pub fn set_hit_count_filter(&self, id: BreakpointId, filter: Option<u32>) {
        let changed = self.update(id, |bp| {
            let changed = bp.hit_count_filter != filter;
            bp.hit_count_filter = filter;
            changed
        });
        if changed {
            self.emit(id, BreakpointChange::HitCountFilter);
        }
    }

    pub fn set_hidden(&self, id: BreakpointId, hidden: bool) {
        let changed = self.update(id, |bp| {
            let changed = bp.hidden != hidden;
            bp.hidden = hidden;
            changed
        });
        if changed {
            self.emit(id, BreakpointChange::Hidden(hidden));
        }
    }

    fn update(&self, id: BreakpointId, f: impl FnOnce(&mut Breakpoint) -> bool) -> bool {
        let mut inner = self.inner.lock();
        match inner.breakpoints.get_mut(&id) {
            Some(bp) => f(bp),
            None => false,
        }
    }

    fn emit(&self, id: BreakpointId, change: BreakpointChange) {
        self.subscribers.emit(&BreakpointEvent { id, change });
    }
}
