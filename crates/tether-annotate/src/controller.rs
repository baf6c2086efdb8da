use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use tether_breakpoints::{
    Breakpoint, BreakpointChange, BreakpointId, BreakpointKind, BreakpointRegistry,
};
use tether_core::{FileId, Line, SubscriptionId};
use tether_scheduler::SerialQueue;
use tether_vfs::{ChangeEvent, DocumentStore};

use crate::index::{ClassDescriptor, FieldDescriptor, MethodDescriptor, StructuralIndex};
use crate::marker::{marker_style, Marker, MarkerHost, MarkerStyle};

/// What a pending structural lookup should resolve.
enum LookupRequest {
    Field(FieldDescriptor),
    Method(MethodDescriptor),
    Class(ClassDescriptor),
}

/// One lookup issued against one document on behalf of one breakpoint.
struct LookupJob {
    breakpoint: BreakpointId,
    file: FileId,
    generation: u64,
    style: MarkerStyle,
    request: LookupRequest,
}

#[derive(Default)]
struct ControllerState {
    tracked: HashSet<FileId>,
    markers: HashMap<BreakpointId, Vec<Marker>>,
    /// Stale-lookup guard: a completion only lands if the breakpoint's
    /// generation still matches the one its job was issued under.
    generation: HashMap<BreakpointId, u64>,
    next_generation: u64,
    active: bool,
}

struct ControllerShared {
    store: Arc<DocumentStore>,
    breakpoints: Arc<BreakpointRegistry>,
    index: Arc<dyn StructuralIndex>,
    host: Arc<dyn MarkerHost>,
    refresh_queue: SerialQueue,
    lookup_queue: SerialQueue,
    state: Mutex<ControllerState>,
}

/// Maintains the marker set for every trackable breakpoint across all open
/// documents.
///
/// All table mutation happens on the two serialized queues while holding the
/// single state lock; "detach old set, compute new set, attach it" is atomic
/// with respect to every other refresh. Structural lookups are issued with
/// the lock released and complete on the dedicated lookup queue, so a slow
/// index never stalls unrelated refreshes.
pub struct AnnotationController {
    shared: Arc<ControllerShared>,
    store_subscription: SubscriptionId,
    breakpoint_subscription: SubscriptionId,
}

impl AnnotationController {
    pub fn new(
        store: Arc<DocumentStore>,
        breakpoints: Arc<BreakpointRegistry>,
        index: Arc<dyn StructuralIndex>,
        host: Arc<dyn MarkerHost>,
    ) -> Self {
        let shared = Arc::new(ControllerShared {
            store: Arc::clone(&store),
            breakpoints: Arc::clone(&breakpoints),
            index,
            host,
            refresh_queue: SerialQueue::new("tether-annotate-refresh"),
            lookup_queue: SerialQueue::new("tether-annotate-lookup"),
            state: Mutex::new(ControllerState {
                active: true,
                ..ControllerState::default()
            }),
        });

        let weak = Arc::downgrade(&shared);
        let store_subscription = store.subscribe(move |event| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match event {
                ChangeEvent::Opened { file, .. } => enqueue_document_opened(&shared, *file),
                ChangeEvent::Closed { file } => enqueue_document_closed(&shared, *file),
                _ => {}
            }
        });

        let weak = Arc::downgrade(&shared);
        let breakpoint_subscription = breakpoints.subscribe(move |event| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let (removed, added) = match &event.change {
                BreakpointChange::Added => (false, true),
                BreakpointChange::Removed => (true, false),
                _ => (true, true),
            };
            enqueue_refresh(&shared, event.id, removed, added);
        });

        Self {
            shared,
            store_subscription,
            breakpoint_subscription,
        }
    }

    /// Starts maintaining markers in `file` for every trackable breakpoint.
    pub fn document_opened(&self, file: FileId) {
        enqueue_document_opened(&self.shared, file);
    }

    /// Detaches every marker bound to `file` and forgets the document.
    pub fn document_closed(&self, file: FileId) {
        enqueue_document_closed(&self.shared, file);
    }

    /// Schedules a refresh: `removed` detaches and forgets the breakpoint's
    /// current marker set, `added` recomputes it from scratch across all
    /// tracked documents.
    pub fn breakpoint_changed(&self, id: BreakpointId, removed: bool, added: bool) {
        enqueue_refresh(&self.shared, id, removed, added);
    }

    /// Global toggle: refreshes every breakpoint, producing the inactive
    /// visual variant for all markers while `active` is false.
    pub fn set_breakpoints_active(&self, active: bool) {
        let shared = Arc::clone(&self.shared);
        self.shared.refresh_queue.enqueue(move || {
            shared.state.lock().active = active;
            for (id, _) in shared.breakpoints.snapshot() {
                run_refresh(&shared, id, true, true);
            }
        });
    }

    /// Blocks until both queues have drained the work submitted so far.
    ///
    /// Lookups that completed synchronously enqueue their continuation onto
    /// the lookup queue from inside a refresh task, so the queues are
    /// flushed in pipeline order.
    pub fn flush(&self) {
        self.shared.refresh_queue.flush();
        self.shared.lookup_queue.flush();
        self.shared.refresh_queue.flush();
    }
}

impl Drop for AnnotationController {
    fn drop(&mut self) {
        self.shared.store.unsubscribe(self.store_subscription);
        self.shared
            .breakpoints
            .unsubscribe(self.breakpoint_subscription);

        // Leave the documents as we found them.
        let shared = Arc::clone(&self.shared);
        self.shared.refresh_queue.enqueue(move || {
            let mut state = shared.state.lock();
            for (_, set) in state.markers.drain() {
                for marker in set {
                    marker.detach();
                }
            }
            state.generation.clear();
            state.tracked.clear();
        });
    }
}

fn enqueue_refresh(shared: &Arc<ControllerShared>, id: BreakpointId, removed: bool, added: bool) {
    let shared_for_task = Arc::clone(shared);
    shared.refresh_queue.enqueue(move || {
        run_refresh(&shared_for_task, id, removed, added);
    });
}

fn enqueue_document_opened(shared: &Arc<ControllerShared>, file: FileId) {
    let shared_for_task = Arc::clone(shared);
    shared.refresh_queue.enqueue(move || {
        run_document_opened(&shared_for_task, file);
    });
}

fn enqueue_document_closed(shared: &Arc<ControllerShared>, file: FileId) {
    let shared_for_task = Arc::clone(shared);
    shared.refresh_queue.enqueue(move || {
        let mut state = shared_for_task.state.lock();
        state.tracked.remove(&file);
        for set in state.markers.values_mut() {
            set.retain(|marker| {
                if marker.file() == file {
                    marker.detach();
                    false
                } else {
                    true
                }
            });
        }
    });
}

/// Primary-queue task: one breakpoint's full marker recomputation.
fn run_refresh(shared: &Arc<ControllerShared>, id: BreakpointId, removed: bool, added: bool) {
    let mut jobs = Vec::new();
    {
        let mut state = shared.state.lock();

        if removed {
            if let Some(old) = state.markers.remove(&id) {
                for marker in old {
                    marker.detach();
                }
            }
        }

        if !added {
            // Invalidate every in-flight lookup for this breakpoint.
            state.generation.remove(&id);
            return;
        }

        let generation = bump_generation(&mut state, id);

        let Some(breakpoint) = shared.breakpoints.get(id) else {
            // Removed between the event and this task; nothing to rebuild.
            state.generation.remove(&id);
            return;
        };
        if breakpoint.hidden {
            return;
        }

        let style = marker_style(&breakpoint, state.active);
        let tracked: Vec<FileId> = state.tracked.iter().copied().collect();
        match &breakpoint.kind {
            BreakpointKind::Line(location) => {
                let file = shared.store.get_id(&location.path);
                if let Some(file) = file.filter(|file| state.tracked.contains(file)) {
                    attach_marker(shared, &mut state, id, file, location.line, style);
                }
            }
            _ => {
                for file in tracked {
                    jobs.extend(lookup_jobs(&breakpoint, id, file, generation, style));
                }
            }
        }
    }

    for job in jobs {
        issue_lookup(shared, job);
    }
}

/// Primary-queue task: fold a newly-opened document into every breakpoint's
/// marker set.
fn run_document_opened(shared: &Arc<ControllerShared>, file: FileId) {
    let mut jobs = Vec::new();
    {
        let mut state = shared.state.lock();
        state.tracked.insert(file);

        for (id, breakpoint) in shared.breakpoints.snapshot() {
            // One marker set per (breakpoint, document): drop leftovers from
            // a previous open of the same document first.
            if let Some(set) = state.markers.get_mut(&id) {
                set.retain(|marker| {
                    if marker.file() == file {
                        marker.detach();
                        false
                    } else {
                        true
                    }
                });
            }

            if breakpoint.hidden {
                continue;
            }
            let style = marker_style(&breakpoint, state.active);
            match &breakpoint.kind {
                BreakpointKind::Line(location) => {
                    if shared.store.get_id(&location.path) == Some(file) {
                        attach_marker(shared, &mut state, id, file, location.line, style);
                    }
                }
                _ => {
                    // Reuse the breakpoint's current generation so pending
                    // lookups for other documents stay valid.
                    let generation = current_generation(&mut state, id);
                    jobs.extend(lookup_jobs(&breakpoint, id, file, generation, style));
                }
            }
        }
    }

    for job in jobs {
        issue_lookup(shared, job);
    }
}

fn bump_generation(state: &mut ControllerState, id: BreakpointId) -> u64 {
    state.next_generation += 1;
    let generation = state.next_generation;
    state.generation.insert(id, generation);
    generation
}

fn current_generation(state: &mut ControllerState, id: BreakpointId) -> u64 {
    if let Some(&generation) = state.generation.get(&id) {
        return generation;
    }
    bump_generation(state, id)
}

/// Candidate lookups for a non-line breakpoint against one document.
///
/// Method and class breakpoints resolve once per non-wildcard class filter;
/// each filter's own result order is preserved, with no ordering guarantee
/// across filters.
fn lookup_jobs(
    breakpoint: &Breakpoint,
    id: BreakpointId,
    file: FileId,
    generation: u64,
    style: MarkerStyle,
) -> Vec<LookupJob> {
    let job = |request| LookupJob {
        breakpoint: id,
        file,
        generation,
        style,
        request,
    };
    match &breakpoint.kind {
        BreakpointKind::Line(_) => Vec::new(),
        BreakpointKind::Field(target) => vec![job(LookupRequest::Field(FieldDescriptor {
            class: target.class.clone(),
            field: target.field.clone(),
        }))],
        BreakpointKind::Method(target) => target
            .class_filters
            .iter()
            .filter(|filter| !filter.contains('*'))
            .map(|filter| {
                job(LookupRequest::Method(MethodDescriptor {
                    class: filter.clone(),
                    method: target.method.clone(),
                    signature: target.signature.clone(),
                }))
            })
            .collect(),
        BreakpointKind::Class(target) => target
            .class_filters
            .iter()
            .filter(|filter| !filter.contains('*'))
            .map(|filter| {
                job(LookupRequest::Class(ClassDescriptor {
                    class: filter.clone(),
                }))
            })
            .collect(),
    }
}

/// Submits one lookup with the state lock released. The continuation hops
/// onto the lookup queue and revalidates before touching the table.
fn issue_lookup(shared: &Arc<ControllerShared>, job: LookupJob) {
    let weak: Weak<ControllerShared> = Arc::downgrade(shared);
    let LookupJob {
        breakpoint,
        file,
        generation,
        style,
        request,
    } = job;

    let done = Box::new(move |lines: Option<Vec<Line>>| {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let queue_shared = Arc::clone(&shared);
        shared.lookup_queue.enqueue(move || {
            complete_lookup(&queue_shared, breakpoint, file, generation, style, lines);
        });
    });

    match &request {
        LookupRequest::Field(descriptor) => shared.index.resolve_field(file, descriptor, done),
        LookupRequest::Method(descriptor) => shared.index.resolve_method(file, descriptor, done),
        LookupRequest::Class(descriptor) => shared.index.resolve_class(file, descriptor, done),
    }
}

/// Lookup-queue task: lands one resolution, unless the world moved on.
fn complete_lookup(
    shared: &Arc<ControllerShared>,
    id: BreakpointId,
    file: FileId,
    generation: u64,
    style: MarkerStyle,
    lines: Option<Vec<Line>>,
) {
    // Unresolved filters are skipped, not retried.
    let Some(lines) = lines else {
        return;
    };

    let mut state = shared.state.lock();

    // Stale-lookup discard: the breakpoint was removed, refreshed again, or
    // the document went away while the index was working.
    if state.generation.get(&id) != Some(&generation) {
        tracing::debug!(
            target = "tether.annotate",
            breakpoint = id.to_raw(),
            "dropping stale lookup result"
        );
        return;
    }
    if !state.tracked.contains(&file) {
        return;
    }

    for line in lines {
        attach_marker(shared, &mut state, id, file, line, style);
    }
}

/// Attaches one marker and records it in the table. A document that cannot
/// take markers is skipped with a diagnostic, never an error.
fn attach_marker(
    shared: &Arc<ControllerShared>,
    state: &mut ControllerState,
    id: BreakpointId,
    file: FileId,
    line: Line,
    style: MarkerStyle,
) {
    match Marker::attach(Arc::clone(&shared.host), file, line, style, id) {
        Ok(marker) => state.markers.entry(id).or_default().push(marker),
        Err(err) => {
            tracing::warn!(
                target = "tether.annotate",
                breakpoint = id.to_raw(),
                file = file.to_raw(),
                line,
                error = %err,
                "cannot attach marker; skipping this document"
            );
        }
    }
}

impl std::fmt::Debug for AnnotationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("AnnotationController")
            .field("tracked_documents", &state.tracked.len())
            .field("breakpoints_with_markers", &state.markers.len())
            .field("active", &state.active)
            .finish()
    }
}
