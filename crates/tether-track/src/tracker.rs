use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use tether_breakpoints::{
    BreakpointChange, BreakpointId, BreakpointRegistry, LineChangeSource, LineLocation,
};
use tether_core::{FileId, Line, SubscriptionId, TextSize};
use tether_scheduler::{KeyedDebouncer, TimerPool};
use tether_vfs::{ChangeEvent, DocPath, DocumentStore};

use crate::config::TrackConfig;

/// Per-breakpoint tracking state.
///
/// `mark` is the sticky byte offset of the tracked line in the live
/// document; `None` means tracking is suspended (document closed, or the
/// stored line fell out of range) until a later relocation succeeds.
#[derive(Debug, Clone, Copy)]
struct TrackerState {
    file: FileId,
    mark: Option<TextSize>,
}

struct TrackerShared {
    store: Arc<DocumentStore>,
    breakpoints: Arc<BreakpointRegistry>,
    debouncer: KeyedDebouncer<BreakpointId>,
    trackers: Mutex<HashMap<BreakpointId, TrackerState>>,
}

/// Keeps the stored line of every line breakpoint anchored to its text.
///
/// Edits move a breakpoint's sticky mark immediately; the write-back to the
/// breakpoint model is gated behind a single-shot debounce that restarts on
/// every further edit, so rapid typing produces at most one model update per
/// pause. A relocation that lands on a whitespace-only line advances to the
/// next non-blank line, bounded only by the document end.
pub struct LineTrackerSet {
    shared: Arc<TrackerShared>,
    store_subscription: SubscriptionId,
    breakpoint_subscription: SubscriptionId,
}

impl LineTrackerSet {
    pub fn new(
        store: Arc<DocumentStore>,
        breakpoints: Arc<BreakpointRegistry>,
        timer: &TimerPool,
        config: TrackConfig,
    ) -> Self {
        let shared = Arc::new(TrackerShared {
            store: Arc::clone(&store),
            breakpoints: Arc::clone(&breakpoints),
            debouncer: KeyedDebouncer::new(timer.handle(), config.relocation_delay()),
            trackers: Mutex::new(HashMap::new()),
        });

        for (id, breakpoint) in breakpoints.snapshot() {
            if let Some(location) = breakpoint.line_location() {
                attach(&shared, id, location);
            }
        }

        let weak = Arc::downgrade(&shared);
        let store_subscription = store.subscribe(move |event| {
            if let Some(shared) = weak.upgrade() {
                on_store_event(&shared, event);
            }
        });

        let weak = Arc::downgrade(&shared);
        let breakpoint_subscription = breakpoints.subscribe(move |event| {
            if let Some(shared) = weak.upgrade() {
                on_breakpoint_event(&shared, event.id, &event.change);
            }
        });

        Self {
            shared,
            store_subscription,
            breakpoint_subscription,
        }
    }

    /// Whether a breakpoint currently has a live anchor in an open document.
    pub fn is_tracking(&self, id: BreakpointId) -> bool {
        self.shared
            .trackers
            .lock()
            .get(&id)
            .is_some_and(|state| state.mark.is_some())
    }
}

impl Drop for LineTrackerSet {
    fn drop(&mut self) {
        self.shared.store.unsubscribe(self.store_subscription);
        self.shared
            .breakpoints
            .unsubscribe(self.breakpoint_subscription);
    }
}

fn attach(shared: &Arc<TrackerShared>, id: BreakpointId, location: &LineLocation) {
    let state = match resolve_mark(shared, &location.path, location.line) {
        Some((file, mark)) => TrackerState {
            file,
            mark: Some(mark),
        },
        None => {
            let Some(file) = shared.store.get_id(&location.path) else {
                // The document was never seen; there is nothing to key the
                // tracker on until it opens.
                return;
            };
            tracing::debug!(
                target = "tether.track",
                breakpoint = id.to_raw(),
                line = location.line,
                "line breakpoint is not resolvable; tracking suspended"
            );
            TrackerState { file, mark: None }
        }
    };
    shared.trackers.lock().insert(id, state);
}

fn resolve_mark(
    shared: &Arc<TrackerShared>,
    path: &DocPath,
    line: Line,
) -> Option<(FileId, TextSize)> {
    let file = shared.store.get_id(path)?;
    let index = shared.store.line_index(file)?;
    Some((file, index.line_start(line)?))
}

fn detach(shared: &Arc<TrackerShared>, id: BreakpointId) {
    shared.debouncer.cancel(&id);
    shared.trackers.lock().remove(&id);
}

fn on_store_event(shared: &Arc<TrackerShared>, event: &ChangeEvent) {
    match event {
        ChangeEvent::Edited { file, edits, .. } => {
            let mut moved = Vec::new();
            {
                let mut trackers = shared.trackers.lock();
                for (id, state) in trackers.iter_mut() {
                    if state.file != *file {
                        continue;
                    }
                    let Some(mut mark) = state.mark else {
                        continue;
                    };
                    let mut touched = false;
                    for edit in edits {
                        if mark < edit.range.start() {
                            continue;
                        }
                        touched = true;
                        if mark >= edit.range.end() {
                            let shifted = u32::from(mark) - u32::from(edit.range.len())
                                + u32::from(edit.new_len());
                            mark = TextSize::from(shifted);
                        } else {
                            mark = edit.range.start();
                        }
                    }
                    if touched {
                        state.mark = Some(mark);
                        moved.push(*id);
                    }
                }
            }
            for id in moved {
                schedule_relocation(shared, id);
            }
        }
        ChangeEvent::Opened { file: _, path } => {
            // Re-attach every line breakpoint waiting on this document.
            for (id, breakpoint) in shared.breakpoints.snapshot() {
                match breakpoint.line_location() {
                    Some(location) if location.path == *path => attach(shared, id, location),
                    _ => {}
                }
            }
        }
        ChangeEvent::Closed { file } => {
            let mut trackers = shared.trackers.lock();
            for state in trackers.values_mut() {
                if state.file == *file {
                    state.mark = None;
                }
            }
        }
        ChangeEvent::Reloaded { file, .. } => {
            // The buffer was replaced wholesale; re-resolve every affected
            // tracker from its breakpoint's stored line.
            let ids: Vec<BreakpointId> = {
                let trackers = shared.trackers.lock();
                trackers
                    .iter()
                    .filter(|(_, state)| state.file == *file)
                    .map(|(id, _)| *id)
                    .collect()
            };
            for id in ids {
                reanchor_from_model(shared, id);
            }
        }
        ChangeEvent::Saved { .. } | ChangeEvent::Renamed { .. } => {}
    }
}

fn on_breakpoint_event(shared: &Arc<TrackerShared>, id: BreakpointId, change: &BreakpointChange) {
    match change {
        BreakpointChange::Added => {
            if let Some(breakpoint) = shared.breakpoints.get(id) {
                if let Some(location) = breakpoint.line_location() {
                    attach(shared, id, location);
                }
            }
        }
        BreakpointChange::Removed => detach(shared, id),
        // Our own debounced write-back echoes here; re-interpreting it as an
        // external relocation request would feed back into itself.
        BreakpointChange::Line {
            source: LineChangeSource::Internal,
            ..
        } => {}
        BreakpointChange::Line {
            source: LineChangeSource::External,
            ..
        } => reanchor_from_model(shared, id),
        BreakpointChange::Path { .. } => {
            detach(shared, id);
            if let Some(breakpoint) = shared.breakpoints.get(id) {
                if let Some(location) = breakpoint.line_location() {
                    attach(shared, id, location);
                }
            }
        }
        _ => {}
    }
}

/// Re-resolves a tracker's mark from the breakpoint model's stored line.
fn reanchor_from_model(shared: &Arc<TrackerShared>, id: BreakpointId) {
    let Some(breakpoint) = shared.breakpoints.get(id) else {
        return;
    };
    let Some(location) = breakpoint.line_location() else {
        return;
    };
    let mut trackers = shared.trackers.lock();
    let Some(state) = trackers.get_mut(&id) else {
        return;
    };
    state.mark = shared
        .store
        .line_index(state.file)
        .and_then(|index| index.line_start(location.line));
    if state.mark.is_none() {
        tracing::debug!(
            target = "tether.track",
            breakpoint = id.to_raw(),
            line = location.line,
            "relocated line is out of range; tracking suspended"
        );
    }
}

fn schedule_relocation(shared: &Arc<TrackerShared>, id: BreakpointId) {
    let weak: Weak<TrackerShared> = Arc::downgrade(shared);
    shared.debouncer.debounce(id, move |_token| {
        let Some(shared) = weak.upgrade() else {
            return Ok(());
        };
        relocate(&shared, id);
        Ok(())
    });
}

/// Runs on the timer thread once edits have quiesced: recomputes the
/// tracked line, skips forward off whitespace-only lines, and writes the
/// result back to the breakpoint model.
fn relocate(shared: &Arc<TrackerShared>, id: BreakpointId) {
    let line = {
        let mut trackers = shared.trackers.lock();
        let Some(state) = trackers.get_mut(&id) else {
            return;
        };
        let Some(mark) = state.mark else {
            return;
        };
        let Some(index) = shared.store.line_index(state.file) else {
            state.mark = None;
            return;
        };

        let landed = index.line_at(mark);
        let line = first_non_blank_at_or_after(&shared.store, state.file, landed).unwrap_or(landed);

        // Re-stick the mark to the start of the line we settled on.
        state.mark = index.line_start(line);
        line
    };

    shared.breakpoints.set_line_internal(id, line);
}

/// First line at or after `line` whose text is not whitespace-only, bounded
/// by the document end. `None` when every remaining line is blank.
fn first_non_blank_at_or_after(store: &DocumentStore, file: FileId, line: Line) -> Option<Line> {
    let count = store.line_count(file)?;
    (line..count).find(|&candidate| {
        store
            .line_text(file, candidate)
            .is_some_and(|text| !text.trim().is_empty())
    })
}

impl std::fmt::Debug for LineTrackerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineTrackerSet")
            .field("trackers", &self.shared.trackers.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_breakpoints::Breakpoint;
    use tether_vfs::ContentChange;

    const DELAY: Duration = Duration::from_millis(40);

    struct Fixture {
        store: Arc<DocumentStore>,
        breakpoints: Arc<BreakpointRegistry>,
        _timer: TimerPool,
        trackers: LineTrackerSet,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(DocumentStore::new());
        let breakpoints = Arc::new(BreakpointRegistry::new());
        let timer = TimerPool::new();
        let trackers = LineTrackerSet::new(
            Arc::clone(&store),
            Arc::clone(&breakpoints),
            &timer,
            TrackConfig {
                relocation_delay_ms: DELAY.as_millis() as u64,
            },
        );
        Fixture {
            store,
            breakpoints,
            _timer: timer,
            trackers,
        }
    }

    fn insert_lines(store: &DocumentStore, file: FileId, line: Line, text: &str) {
        store
            .apply_changes(file, 0, &[ContentChange::insert_at_line_start(line, text)])
            .unwrap();
    }

    fn stored_line(breakpoints: &BreakpointRegistry, id: BreakpointId) -> Line {
        breakpoints.get(id).unwrap().line_location().unwrap().line
    }

    fn wait_for_line(
        breakpoints: &BreakpointRegistry,
        id: BreakpointId,
        expected: Line,
    ) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while std::time::Instant::now() < deadline {
            if stored_line(breakpoints, id) == expected {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        stored_line(breakpoints, id) == expected
    }

    #[test]
    fn rapid_edits_coalesce_into_one_write_back() {
        let f = fixture();
        let path = DocPath::new("file:///t/Coalesce.java");
        let file = f.store.open_document(
            path.clone(),
            "l0\nl1\nl2\nl3\nl4\nl5\nl6\nl7\nl8\nl9\nl10\ntarget();\n",
            1,
        );
        let bp = f.breakpoints.add(Breakpoint::line(path, 11));

        let writes = Arc::new(Mutex::new(Vec::new()));
        let writes_for_sub = Arc::clone(&writes);
        f.breakpoints.subscribe(move |event| {
            if let BreakpointChange::Line { line, source } = &event.change {
                assert_eq!(*source, LineChangeSource::Internal);
                writes_for_sub.lock().push(*line);
            }
        });

        // Five rapid single-line insertions above the breakpoint, each well
        // inside the debounce window.
        for _ in 0..5 {
            insert_lines(&f.store, file, 0, "inserted();\n");
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(wait_for_line(&f.breakpoints, bp, 16));
        std::thread::sleep(DELAY * 3);
        assert_eq!(writes.lock().as_slice(), &[16]);
    }

    #[test]
    fn relocation_skips_whitespace_only_lines() {
        let f = fixture();
        let path = DocPath::new("file:///t/Blank.java");
        let file = f
            .store
            .open_document(path.clone(), "one();\ntwo();\nthree();\n", 1);
        let bp = f.breakpoints.add(Breakpoint::line(path, 1));

        // Blank out the breakpoint's line; the anchor is absorbed into a
        // whitespace-only line and must move forward to `three();`.
        f.store
            .apply_changes(
                file,
                2,
                &[ContentChange::replace(
                    tether_core::Range::new(
                        tether_core::Position::new(1, 0),
                        tether_core::Position::new(1, 6),
                    ),
                    "   ",
                )],
            )
            .unwrap();

        assert!(wait_for_line(&f.breakpoints, bp, 2));
    }

    #[test]
    fn external_line_change_re_anchors_the_tracker() {
        let f = fixture();
        let path = DocPath::new("file:///t/External.java");
        let file = f
            .store
            .open_document(path.clone(), "a();\nb();\nc();\nd();\n", 1);
        let bp = f.breakpoints.add(Breakpoint::line(path, 1));

        // The user retargets the breakpoint from line 1 to line 3.
        f.breakpoints.set_line(bp, 3);

        // Edits above now shift the new anchor, not the old one.
        insert_lines(&f.store, file, 0, "x();\n");
        assert!(wait_for_line(&f.breakpoints, bp, 4));
    }

    #[test]
    fn removed_breakpoints_stop_tracking() {
        let f = fixture();
        let path = DocPath::new("file:///t/Removed.java");
        let file = f.store.open_document(path.clone(), "a();\nb();\n", 1);
        let bp = f.breakpoints.add(Breakpoint::line(path, 1));

        insert_lines(&f.store, file, 0, "x();\n");
        f.breakpoints.remove(bp);

        std::thread::sleep(DELAY * 3);
        assert!(!f.trackers.is_tracking(bp));
        assert_eq!(f.breakpoints.get(bp), None);
    }

    #[test]
    fn out_of_range_breakpoints_suspend_until_relocated() {
        let f = fixture();
        let path = DocPath::new("file:///t/Range.java");
        let _file = f.store.open_document(path.clone(), "a();\nb();\n", 1);
        let bp = f.breakpoints.add(Breakpoint::line(path, 40));

        assert!(!f.trackers.is_tracking(bp));

        // A later external relocation into range resumes tracking.
        f.breakpoints.set_line(bp, 1);
        assert!(f.trackers.is_tracking(bp));
    }

    #[test]
    fn path_change_moves_tracking_to_the_new_document() {
        let f = fixture();
        let old_path = DocPath::new("file:///t/Old.java");
        let new_path = DocPath::new("file:///t/New.java");
        f.store.open_document(old_path.clone(), "a();\nb();\n", 1);
        let new_file = f
            .store
            .open_document(new_path.clone(), "x();\ny();\nz();\n", 1);
        let bp = f.breakpoints.add(Breakpoint::line(old_path, 1));

        f.breakpoints.set_path(bp, new_path);

        insert_lines(&f.store, new_file, 0, "w();\n");
        assert!(wait_for_line(&f.breakpoints, bp, 2));
    }

    #[test]
    fn closed_documents_suspend_tracking_until_reopened() {
        let f = fixture();
        let path = DocPath::new("file:///t/Close.java");
        let file = f.store.open_document(path.clone(), "a();\nb();\nc();\n", 1);
        let bp = f.breakpoints.add(Breakpoint::line(path.clone(), 1));

        f.store.close_document(file);
        assert!(!f.trackers.is_tracking(bp));

        let file = f.store.open_document(path, "a();\nb();\nc();\n", 2);
        assert!(f.trackers.is_tracking(bp));

        insert_lines(&f.store, file, 0, "x();\n");
        assert!(wait_for_line(&f.breakpoints, bp, 2));
    }
}
